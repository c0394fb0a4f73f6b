//! # 分发器模块
//!
//! 按 `x-api-method` 查询参数把请求路由到已注册的处理器。
//! 查找失败时支持两种模式：严格模式抛出异常，宽容模式把"未被管理"
//! 作为正常结果返回，由调用方决定如何响应。分发器自身从不写输出。

use std::collections::HashMap;
use std::sync::Arc;

use log::error;

use crate::auth::AuthorizationDetails;
use crate::exception::Exception;
use crate::param::API_METHOD_PARAMETER;
use crate::request::RequestView;
use crate::response::ResponseWriter;

/// 处理器签名。
///
/// 入参依次为：工作线程标识、响应写入器、请求视图、鉴权通过时的授权详情。
/// 处理器返回错误不影响连接收尾，由服务循环记录日志。
pub type Handler = Arc<
    dyn Fn(
            &str,
            &mut ResponseWriter<'_>,
            &RequestView,
            Option<&AuthorizationDetails>,
        ) -> Result<(), Exception>
        + Send
        + Sync,
>;

/// 宽容模式下的分发结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 请求被某个处理器接管
    Handled,
    /// 没有处理器认领，分发器未写任何输出，如何响应由调用方决定
    NotManaged,
}

/// 处理器注册表。注册阶段完成后只读，可跨线程共享。
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// 注册一个处理器。重复注册同名方法时后写胜出。
    pub fn register<F>(&mut self, method: &str, handler: F)
    where
        F: Fn(
                &str,
                &mut ResponseWriter<'_>,
                &RequestView,
                Option<&AuthorizationDetails>,
            ) -> Result<(), Exception>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(method.to_string(), Arc::new(handler));
    }

    /// 已注册的处理器数量
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 分发一个请求。
    ///
    /// 从查询参数读取 `x-api-method`（可缺失），再查找注册表：
    /// - 命中：调用处理器并透传其结果，返回 [`DispatchOutcome::Handled`]。
    /// - 参数缺失或方法未注册：`exception_if_not_managed` 为真时返回
    ///   [`Exception::UnmanagedRequest`]；为假时返回
    ///   [`DispatchOutcome::NotManaged`]，不调用任何处理器也不写输出。
    ///
    /// 处理器自身的错误不在这里捕获，边界由服务循环负责。
    pub fn dispatch(
        &self,
        thread_id: &str,
        writer: &mut ResponseWriter<'_>,
        view: &RequestView,
        details: Option<&AuthorizationDetails>,
        exception_if_not_managed: bool,
    ) -> Result<DispatchOutcome, Exception> {
        let method: String =
            view.query_parameter(API_METHOD_PARAMETER, String::new(), false)?;

        if method.is_empty() {
            let detail = format!(
                "request is not managed because '{}' is missing",
                API_METHOD_PARAMETER
            );
            return self.not_managed(thread_id, detail, exception_if_not_managed);
        }

        match self.handlers.get(&method) {
            Some(handler) => {
                handler(thread_id, writer, view, details)?;
                Ok(DispatchOutcome::Handled)
            }
            None => {
                let detail = format!("No API method managed for {}", method);
                self.not_managed(thread_id, detail, exception_if_not_managed)
            }
        }
    }

    fn not_managed(
        &self,
        thread_id: &str,
        detail: String,
        exception_if_not_managed: bool,
    ) -> Result<DispatchOutcome, Exception> {
        error!("[{}]{}", thread_id, detail);
        if exception_if_not_managed {
            Err(Exception::UnmanagedRequest(detail))
        } else {
            Ok(DispatchOutcome::NotManaged)
        }
    }
}
