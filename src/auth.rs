// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 鉴权门禁模块
//!
//! 该模块实现 HTTP Basic 凭证的提取与外部鉴权器的对接：
//! 1. 从 `Authorization` 标头的原始值解码出用户名与密码。
//! 2. 通过 [`Authenticator`] 特性把凭证交给外部组件校验。
//! 3. 把所有失败统一收敛为 [`Exception::Unauthorized`]，不向客户端泄露
//!    失败的具体原因。

use std::any::Any;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info};

use crate::exception::Exception;
use crate::request::RequestView;

/// 从 `Authorization` 标头解码出的一对凭证。
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// 鉴权器通过校验后返回的授权详情，类型由外部组件自行定义。
///
/// 门禁只负责把它原样传递给被选中的处理器。
pub type AuthorizationDetails = Arc<dyn Any + Send + Sync>;

/// 外部鉴权组件的接入点。
///
/// 校验逻辑（账号库查询、角色计算等）不属于本核心，由实现方提供。
pub trait Authenticator: Send + Sync {
    /// 该请求是否需要鉴权。默认所有请求都需要。
    fn is_auth_required(&self, _view: &RequestView) -> bool {
        true
    }

    /// 校验一对凭证。通过则返回授权详情，拒绝则返回错误。
    ///
    /// 返回的错误若是 [`Exception::Unauthorized`] 则保留其携带的状态码，
    /// 其它错误一律收敛为 401。
    fn check_authorization(
        &self,
        thread_id: &str,
        view: &RequestView,
        username: &str,
        password: &str,
    ) -> Result<AuthorizationDetails, Exception>;
}

/// 解码 `Authorization` 标头的 Basic 凭证。
///
/// 方案前缀 `"Basic "` 区分大小写。base64 载荷解码后按第一个 `:` 拆分为
/// 用户名与密码。任何一步失败（前缀不符、base64 非法、载荷非 UTF-8、
/// 缺少冒号）都返回 [`Exception::Unauthorized`]，只在服务端日志记录细节。
pub fn decode_basic_credential(authorization: &str) -> Result<Credential, Exception> {
    let payload = match authorization.strip_prefix("Basic ") {
        Some(payload) => payload,
        None => {
            error!("Authorization标头不是Basic方案：{}", authorization);
            return Err(Exception::Unauthorized(401));
        }
    };

    let decoded = match STANDARD.decode(payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            error!("Basic凭证的base64解码失败: {}", e);
            return Err(Exception::Unauthorized(401));
        }
    };

    let decoded = match String::from_utf8(decoded) {
        Ok(decoded) => decoded,
        Err(_) => {
            error!("Basic凭证的载荷不是合法的UTF-8");
            return Err(Exception::Unauthorized(401));
        }
    };

    match decoded.split_once(':') {
        Some((username, password)) => Ok(Credential {
            username: username.to_string(),
            password: password.to_string(),
        }),
        None => {
            error!("Basic凭证缺少冒号分隔符");
            Err(Exception::Unauthorized(401))
        }
    }
}

/// 对一个已构建的请求执行完整的鉴权流程。
///
/// # 逻辑步骤
/// 1. 鉴权器声明该请求免鉴权时直接放行，返回 `Ok(None)`。
/// 2. 读取 `Authorization` 标头的**原始**值。凭证的 base64 载荷可能包含
///    `+`，绝不能经过查询参数式解码。
/// 3. 解码凭证并交给鉴权器校验。
/// 4. 任何失败都映射为 [`Exception::Unauthorized`]，携带鉴权器给出的
///    状态码（缺省 401）。
pub fn authorize(
    authenticator: &dyn Authenticator,
    thread_id: &str,
    view: &RequestView,
) -> Result<Option<AuthorizationDetails>, Exception> {
    if !authenticator.is_auth_required(view) {
        info!("[{}]请求免鉴权：{}", thread_id, view.uri());
        return Ok(None);
    }

    let authorization = match view.raw_header("Authorization") {
        Some(authorization) if !authorization.is_empty() => authorization,
        _ => {
            error!("[{}]缺少Authorization标头", thread_id);
            return Err(Exception::Unauthorized(401));
        }
    };

    let credential = decode_basic_credential(authorization)?;

    match authenticator.check_authorization(
        thread_id,
        view,
        &credential.username,
        &credential.password,
    ) {
        Ok(details) => Ok(Some(details)),
        Err(e) => {
            error!("[{}]鉴权器拒绝了凭证: {}", thread_id, e);
            match e {
                Exception::Unauthorized(code) => Err(Exception::Unauthorized(code)),
                _ => Err(Exception::Unauthorized(401)),
            }
        }
    }
}
