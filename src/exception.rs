// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了 FastCGI 请求处理生命周期中可能抛出的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖参数校验错误、请求体解码错误、鉴权错误以及分发失败。
//! - **语义映射**：每个变体都能通过 [`Exception::status_code`] 转化为发送给
//!   客户端的 HTTP 状态码。
//! - **上下文携带**：错误信息总是携带参数名，并在安全的前提下携带原始值，
//!   便于日志审计。

use std::fmt;

/// 请求处理过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回，用于指示处理失败的具体原因。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 必需的查询参数或标头缺失（或映射到空字符串）。
    MissingParameter(String),
    /// 参数存在，但无法转换为期望的类型，或不在允许值列表内。
    InvalidParameterValue { name: String, value: String },
    /// `Content-Range` 标头不符合 `bytes <start>-<end>/<size>` 格式。
    MalformedContentRange(String),
    /// 请求体声明的长度超过了配置的上限。在读取任何请求体字节之前检测。
    ContentTooLarge {
        content_length: u64,
        max_content_length: u64,
    },
    /// Basic 鉴权缺失、格式非法或被外部鉴权器拒绝。携带 HTTP 状态码（默认401）。
    Unauthorized(u16),
    /// 请求未被任何已注册的处理器管理（严格分发模式下抛出）。
    UnmanagedRequest(String),
    /// 未分类的内部错误（传输层写入失败等）。
    Internal(String),
}

impl Exception {
    /// 将异常映射为发送给客户端的 HTTP 状态码。
    ///
    /// 请求构建阶段的所有失败统一映射为 500；鉴权失败使用其携带的状态码
    /// （通常是 401）。
    pub fn status_code(&self) -> u16 {
        match self {
            Exception::Unauthorized(code) => *code,
            _ => 500,
        }
    }
}

use Exception::*;

/// 为 `Exception` 实现 `Display` 特性，使其支持字符串格式化输出。
///
/// 这些描述信息用于系统日志以及 500 错误响应体中。
impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingParameter(name) => {
                write!(f, "The {} parameter is missing", name)
            }
            InvalidParameterValue { name, value } => {
                write!(f, "The {} parameter has an invalid value: {}", name, value)
            }
            MalformedContentRange(text) => {
                write!(
                    f,
                    "Content-Range is not well done. Expected format: 'bytes <start>-<end>/<size>', contentRange: {}",
                    text
                )
            }
            ContentTooLarge {
                content_length,
                max_content_length,
            } => {
                write!(
                    f,
                    "ContentLength too long, contentLength: {}, maxContentLength: {}",
                    content_length, max_content_length
                )
            }
            Unauthorized(code) => write!(f, "Unauthorized ({})", code),
            UnmanagedRequest(detail) => write!(f, "Request is not managed: {}", detail),
            Internal(detail) => write!(f, "Internal server error: {}", detail),
        }
    }
}

impl std::error::Error for Exception {}
