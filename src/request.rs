// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求视图模块
//!
//! 该模块是本核心的入口组件之一，负责把传输层交付的一个原始请求
//! （环境变量序列 + 请求体字节流）解码为强类型的只读 [`RequestView`]。
//! 它涵盖了：
//! 1. 环境变量（`key=value`）到标头/详情映射表的解析。
//! 2. `QUERY_STRING` 到查询参数映射表的解析。
//! 3. 受配置上限约束的请求体读取。
//! 4. `Content-Range` 标头的解析。

use std::collections::HashMap;

use bytes::Bytes;
use log::{debug, error};

use crate::exception::Exception;
use crate::param::{self, FromParam};
use crate::transport::TransportRequest;

/// 表示一个已被接受的请求的完整只读视图。
///
/// 每个被接受的请求恰好构建一次；进入处理器分发后不再变更，
/// 请求完成时随之销毁。
#[derive(Debug, Clone)]
pub struct RequestView {
    /// 请求方法（GET、POST 等，取自 `REQUEST_METHOD`）
    request_method: String,
    /// 请求 URI（取自 `REQUEST_URI`）
    request_uri: String,
    /// 原始请求体字节，长度受配置上限约束
    request_body: Bytes,
    /// 有效的请求体长度（传输层实际交付的字节数）
    content_length: u64,
    /// 客户端地址。取自 `x-forwarded-for` 标头：直连对端是负载均衡器，
    /// 因此不使用 `REMOTE_ADDR`。
    client_ip_address: String,
    /// 客户端是否要求压缩响应体（`x-responseBodyCompressed: true`）
    response_body_compressed: bool,
    /// 环境变量映射表（标头以 `HTTP_` 前缀键存放）
    request_details: HashMap<String, String>,
    /// 查询参数映射表（保留原始值，读取时才解码）
    query_parameters: HashMap<String, String>,
}

impl RequestView {
    /// 从传输层请求单元构建 `RequestView` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 解析环境变量：缺少 `=` 的条目记录日志后跳过，不致命；重复键后写胜出。
    /// 2. 解析 `QUERY_STRING`：按 `&` 拆分，按第一个 `=` 拆分键值。
    /// 3. 仅当方法为 POST 或 PUT 时读取请求体：`CONTENT_LENGTH` 缺失视为 0，
    ///    超过 `max_content_length` 时在读取任何字节之前失败。
    /// 4. 提取 URI、压缩标志和客户端地址。
    ///
    /// # 参数
    /// * `request` - 传输层交付的请求单元。
    /// * `max_content_length` - 配置的请求体长度上限（字节）。
    /// * `id` - 请求标识，用于在多线程环境下追踪日志。
    ///
    /// # 错误处理
    /// 声明长度超限返回 [`Exception::ContentTooLarge`]；`CONTENT_LENGTH`
    /// 无法解析返回 [`Exception::InvalidParameterValue`]。传输层实际交付的
    /// 字节数少于声明值不是错误，实际字节数成为有效长度。
    pub fn build(
        request: &mut dyn TransportRequest,
        max_content_length: u64,
        id: u64,
    ) -> Result<Self, Exception> {
        let mut request_details = HashMap::new();
        for entry in request.environment() {
            match entry.split_once('=') {
                Some((key, value)) => {
                    request_details.insert(key.to_string(), value.to_string());
                }
                None => {
                    error!("[ID{}]非预期的环境变量：{}", id, entry);
                }
            }
        }

        let mut query_parameters = HashMap::new();
        if let Some(query_string) = request_details.get("QUERY_STRING") {
            fill_query_string(query_string, &mut query_parameters, id);
        }

        let request_method = request_details
            .get("REQUEST_METHOD")
            .cloned()
            .unwrap_or_default();

        let mut content_length: u64 = 0;
        let mut request_body = Bytes::new();
        if request_method == "POST" || request_method == "PUT" {
            content_length =
                param::get_parameter(&request_details, "CONTENT_LENGTH", 0u64, false, &[])?;
            if content_length > max_content_length {
                error!(
                    "[ID{}]请求体长度超限：contentLength: {}, maxContentLength: {}",
                    id, content_length, max_content_length
                );
                return Err(Exception::ContentTooLarge {
                    content_length,
                    max_content_length,
                });
            }

            if content_length > 0 {
                let mut buffer = vec![0u8; content_length as usize];
                let mut total_read = 0usize;
                loop {
                    match request.read(&mut buffer[total_read..]) {
                        Ok(0) => break,
                        Ok(n) => {
                            total_read += n;
                            if total_read == buffer.len() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("[ID{}]读取请求体时遇到错误: {}", id, e);
                            return Err(Exception::Internal(e.to_string()));
                        }
                    }
                }
                // 传输层实际交付的字节数成为有效长度
                buffer.truncate(total_read);
                content_length = total_read as u64;
                request_body = Bytes::from(buffer);
            }
        }

        let request_uri = request_details
            .get("REQUEST_URI")
            .cloned()
            .unwrap_or_default();

        let response_body_compressed = param::get_header_parameter(
            &request_details,
            "x-responseBodyCompressed",
            false,
            false,
            &[],
        )?;

        let client_ip_address = param::get_header_parameter(
            &request_details,
            "x-forwarded-for",
            "".to_string(),
            false,
            &[],
        )?;

        debug!(
            "[ID{}]RequestView构建完成：method={}, uri={}, contentLength={}, compressed={}",
            id, request_method, request_uri, content_length, response_body_compressed
        );

        Ok(Self {
            request_method,
            request_uri,
            request_body,
            content_length,
            client_ip_address,
            response_body_compressed,
            request_details,
            query_parameters,
        })
    }
}

// --- Getter 访问器实现 ---

impl RequestView {
    /// 获取请求方法
    pub fn method(&self) -> &str {
        &self.request_method
    }

    /// 获取请求 URI
    pub fn uri(&self) -> &str {
        &self.request_uri
    }

    /// 获取原始请求体字节
    pub fn body(&self) -> &Bytes {
        &self.request_body
    }

    /// 获取有效的请求体长度
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// 获取客户端地址（来自 `x-forwarded-for`）
    pub fn client_ip_address(&self) -> &str {
        &self.client_ip_address
    }

    /// 客户端是否要求压缩响应体
    pub fn response_body_compressed(&self) -> bool {
        self.response_body_compressed
    }

    /// 获取环境详情映射表
    pub fn request_details(&self) -> &HashMap<String, String> {
        &self.request_details
    }

    /// 获取查询参数映射表（原始值）
    pub fn query_parameters(&self) -> &HashMap<String, String> {
        &self.query_parameters
    }

    /// 按传输层内部键读取标头的原始值，不经过任何解码。
    ///
    /// Basic 鉴权等对原始字节敏感的场景使用该访问器。
    pub fn raw_header(&self, header_name: &str) -> Option<&str> {
        self.request_details
            .get(&param::header_key(header_name))
            .map(|v| v.as_str())
    }

    /// 带校验地读取查询参数
    pub fn query_parameter<T>(
        &self,
        name: &str,
        default: T,
        mandatory: bool,
    ) -> Result<T, Exception>
    where
        T: FromParam + PartialEq,
    {
        param::get_parameter(&self.query_parameters, name, default, mandatory, &[])
    }

    /// 带校验地读取标头参数
    pub fn header<T>(&self, name: &str, default: T, mandatory: bool) -> Result<T, Exception>
    where
        T: FromParam + PartialEq,
    {
        param::get_header_parameter(&self.request_details, name, default, mandatory, &[])
    }

    /// 以 `(小写连字符名, 值)` 对的形式列出所有 `HTTP_*` 标头。
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        for (key, value) in &self.request_details {
            if let Some(stripped) = key.strip_prefix("HTTP_") {
                headers.push((
                    stripped.to_ascii_lowercase().replace('_', "-"),
                    value.clone(),
                ));
            }
        }
        headers
    }
}

/// 解析 `QUERY_STRING`：按 `&` 拆分，按第一个 `=` 拆分键值。
///
/// 没有 `=` 的 token 记录日志后跳过，不致命；重复键后写胜出。
fn fill_query_string(query_string: &str, query_parameters: &mut HashMap<String, String>, id: u64) {
    for token in query_string.split('&') {
        if token.is_empty() {
            continue;
        }
        match token.split_once('=') {
            Some((key, value)) => {
                query_parameters.insert(key.to_string(), value.to_string());
            }
            None => {
                error!("[ID{}]查询参数格式错误，token: {}", id, token);
            }
        }
    }
}

/// 解析 `Content-Range: bytes <start>-<end>/<size>`。
///
/// 必须包含字面 `bytes ` 标记并能定位 `-` 与 `/` 分隔符；三个字段都必须是
/// 合法的无符号整数，任意一个字段解析失败都返回
/// [`Exception::MalformedContentRange`]。不支持 `bytes */<size>` 或多区间。
pub fn parse_content_range(content_range: &str) -> Result<(u64, u64, u64), Exception> {
    let malformed = || Exception::MalformedContentRange(content_range.to_string());

    let pos = match content_range.find("bytes ") {
        Some(pos) => pos,
        None => {
            error!("Content-Range缺少'bytes '标记：{}", content_range);
            return Err(malformed());
        }
    };
    let rest = &content_range[pos + 6..];

    let dash = rest.find('-').ok_or_else(malformed)?;
    let slash = rest.find('/').ok_or_else(malformed)?;
    if slash < dash {
        return Err(malformed());
    }

    let start = rest[..dash].parse::<u64>().map_err(|_| malformed())?;
    let end = rest[dash + 1..slash].parse::<u64>().map_err(|_| malformed())?;
    let size = rest[slash + 1..].parse::<u64>().map_err(|_| malformed())?;

    Ok((start, end, size))
}
