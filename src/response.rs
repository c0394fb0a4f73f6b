//! # 响应写入模块
//!
//! 该模块把状态码、标头与响应体组装成 CGI 风格的响应文本并交给传输层。
//! 两个关键约束贯穿所有发送方法：
//! 1. 传输层的格式化写原语把 `%` 视为格式指令，响应体中的字面 `%`
//!    必须先转义为 `%%`，但 `Content-Length` 按转义**之前**的长度计算。
//! 2. 每个请求只允许完成一次输出。第二次发送调用只记录错误日志，
//!    不产生任何写入。

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, info};

use crate::exception::Exception;
use crate::param::{standard_message, CRLF};
use crate::transport::TransportRequest;

/// 随成功响应下发的会话cookie。
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
}

/// 跨域响应头配置。`origin` 为空时回显 `*`。
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    pub origin: Option<String>,
}

/// 单个请求的响应写入器。
///
/// 持有传输层请求单元的独占借用，生命周期与该请求的处理过程一致。
pub struct ResponseWriter<'a> {
    request: &'a mut dyn TransportRequest,
    finished: bool,
    thread_id: String,
    request_identifier: u64,
    request_uri: String,
    request_method: String,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(
        request: &'a mut dyn TransportRequest,
        thread_id: &str,
        request_identifier: u64,
        request_uri: &str,
        request_method: &str,
    ) -> Self {
        Self {
            request,
            finished: false,
            thread_id: thread_id.to_string(),
            request_identifier,
            request_uri: request_uri.to_string(),
            request_method: request_method.to_string(),
        }
    }

    /// 本请求的输出是否已经完成
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// 处理路径没有产生任何响应时的兜底收尾。
    pub fn finish_if_needed(&mut self) {
        if !self.finished {
            self.request.finish();
            self.finished = true;
        }
    }

    /// 第二次发送是编程错误：记录日志并拒绝写入。
    fn already_finished(&self) -> bool {
        if self.finished {
            error!(
                "[{}]response was already done, requestIdentifier: {}, requestURI: {}, requestMethod: {}",
                self.thread_id, self.request_identifier, self.request_uri, self.request_method
            );
            return true;
        }
        false
    }

    /// 发送一个成功响应。
    ///
    /// # 参数
    /// * `code` - 状态码，必须在标准短语表内。
    /// * `body` - 响应体。为空时不发送 `Content-Type`。
    /// * `content_type` - 完整的 `Content-Type` 标头行（不含换行）。
    ///   `None` 且响应体非空时使用 `application/json; charset=utf-8`。
    /// * `cookie` - 可选的 `Set-Cookie` 标头。
    /// * `cors` - 可选的跨域标头块。
    /// * `compressed` - 为真时用 gzip 压缩响应体，`Content-Length`
    ///   取压缩后的长度，并附加 `X-CompressedBody: true` 标头。
    pub fn send_success(
        &mut self,
        code: u16,
        body: &str,
        content_type: Option<&str>,
        cookie: Option<&Cookie>,
        cors: Option<&CorsPolicy>,
        compressed: bool,
    ) -> Result<(), Exception> {
        if self.already_finished() {
            return Ok(());
        }

        let http_status = format!("Status: {} {}{}", code, standard_message(code), CRLF);

        let mut local_content_type = String::new();
        if !body.is_empty() {
            match content_type {
                Some(content_type) => {
                    local_content_type = format!("{}{}", content_type, CRLF);
                }
                None => {
                    local_content_type =
                        format!("Content-Type: application/json; charset=utf-8{}", CRLF);
                }
            }
        }

        let mut cookie_header = String::new();
        if let Some(cookie) = cookie {
            if !cookie.name.is_empty() && !cookie.value.is_empty() {
                cookie_header = format!("Set-Cookie: {}={}", cookie.name, cookie.value);
                if let Some(path) = &cookie.path {
                    cookie_header.push_str(&format!("; Path={}", path));
                }
                cookie_header.push_str(CRLF);
            }
        }

        let mut cors_header = String::new();
        if let Some(cors) = cors {
            let origin = cors.origin.as_deref().unwrap_or("*");
            cors_header = format!(
                "Access-Control-Allow-Origin: {}{}\
                 Access-Control-Allow-Methods: GET, POST, OPTIONS{}\
                 Access-Control-Allow-Credentials: true{}\
                 Access-Control-Allow-Headers: DNT,User-Agent,X-Requested-With,If-Modified-Since,Cache-Control,Content-Type,Range{}\
                 Access-Control-Expose-Headers: Content-Length,Content-Range{}",
                origin, CRLF, CRLF, CRLF, CRLF, CRLF
            );
        }

        if compressed {
            let compressed_body = compress(body.as_bytes())?;
            let content_length = compressed_body.len();

            let head_response = format!(
                "{}{}{}{}Content-Length: {}{}X-CompressedBody: true{}{}",
                http_status,
                local_content_type,
                cookie_header,
                cors_header,
                content_length,
                CRLF,
                CRLF,
                CRLF
            );

            self.write_formatted(&head_response)?;

            info!(
                "[{}]sendSuccess, requestIdentifier: {}, requestURI: {}, requestMethod: {}, responseBody.size: @{}@, compressedResponseBody.size: @{}@",
                self.thread_id,
                self.request_identifier,
                self.request_uri,
                self.request_method,
                body.len(),
                content_length
            );

            // 压缩后的字节流走原样写，避免任何格式化处理
            self.write_raw(&compressed_body)?;
        } else {
            // Content-Length必须在%转义之前计算：对格式化写原语而言
            // %%只是一个字符
            let content_length = body.len();

            let escaped_body;
            let body_to_send = if body.contains('%') {
                escaped_body = body.replace('%', "%%");
                escaped_body.as_str()
            } else {
                body
            };

            let complete_http_response = format!(
                "{}{}{}{}Content-Length: {}{}{}{}",
                http_status,
                local_content_type,
                cookie_header,
                cors_header,
                content_length,
                CRLF,
                CRLF,
                body_to_send
            );

            if !self.request_uri.ends_with("/status") {
                // 响应体经常很长，只记录状态行
                info!(
                    "[{}]sendSuccess, requestIdentifier: {}, requestURI: {}, requestMethod: {}, responseBody.size: @{}@, httpStatus: {}",
                    self.thread_id,
                    self.request_identifier,
                    self.request_uri,
                    self.request_method,
                    body.len(),
                    http_status.trim_end()
                );
            }

            self.write_formatted(&complete_http_response)?;
        }

        self.request.finish();
        self.finished = true;
        Ok(())
    }

    /// 发送一个重定向响应。`permanent` 为真时使用 301，否则 302。
    pub fn send_redirect(
        &mut self,
        location_url: &str,
        permanent: bool,
        content_type: Option<&str>,
    ) -> Result<(), Exception> {
        if self.already_finished() {
            return Ok(());
        }

        let code: u16 = if permanent { 301 } else { 302 };

        let mut complete_http_response = format!(
            "Status: {} {}{}Location: {}{}",
            code,
            standard_message(code),
            CRLF,
            location_url,
            CRLF
        );
        match content_type {
            Some(content_type) => {
                complete_http_response
                    .push_str(&format!("Content-Type: {}{}{}", content_type, CRLF, CRLF));
            }
            None => complete_http_response.push_str(CRLF),
        }

        info!(
            "[{}]HTTP Success, response: {}",
            self.thread_id, complete_http_response
        );

        self.write_formatted(&complete_http_response)?;

        self.request.finish();
        self.finished = true;
        Ok(())
    }

    /// 发送 HEAD 请求的成功响应，通过 `Content-Range` 告知资源大小。
    pub fn send_head_success(&mut self, code: u16, file_size: u64) -> Result<(), Exception> {
        if self.already_finished() {
            return Ok(());
        }

        let complete_http_response = format!(
            "Status: {} {}{}Content-Range: bytes 0-{}{}{}",
            code,
            standard_message(code),
            CRLF,
            file_size,
            CRLF,
            CRLF
        );

        info!(
            "[{}]HTTP HEAD Success, response: {}",
            self.thread_id, complete_http_response
        );

        self.write_formatted(&complete_http_response)?;

        self.request.finish();
        self.finished = true;
        Ok(())
    }

    /// 组装断点续传探测的 HEAD 响应文本。
    ///
    /// 只构建并记录响应，不向传输层写入任何内容，也不消耗本次发送机会：
    /// 上传场景下该文本由外部组件投递。
    pub fn resume_head_response(&self, code: u16, file_size: u64) -> String {
        let complete_http_response = format!(
            "Status: {} {}{}X-CatraMMS-Resume: {}{}{}",
            code,
            standard_message(code),
            CRLF,
            file_size,
            CRLF,
            CRLF
        );

        info!(
            "[{}]HTTP HEAD Success, response: {}",
            self.thread_id, complete_http_response
        );

        complete_http_response
    }

    /// 发送一个错误响应。响应体原样使用调用方给出的消息，
    /// `Content-Type` 固定为 JSON。
    pub fn send_error(&mut self, code: u16, message: &str) -> Result<(), Exception> {
        if self.already_finished() {
            return Ok(());
        }

        // 同send_success：先按原始长度计算Content-Length，再转义%
        let content_length = message.len();

        let escaped_body;
        let body_to_send = if message.contains('%') {
            escaped_body = message.replace('%', "%%");
            escaped_body.as_str()
        } else {
            message
        };

        let complete_http_response = format!(
            "Status: {} {}{}Content-Type: application/json; charset=utf-8{}Content-Length: {}{}{}{}",
            code,
            standard_message(code),
            CRLF,
            CRLF,
            content_length,
            CRLF,
            CRLF,
            body_to_send
        );

        info!(
            "[{}]HTTP Error, response: {}",
            self.thread_id, complete_http_response
        );

        self.write_formatted(&complete_http_response)?;

        self.request.finish();
        self.finished = true;
        Ok(())
    }

    fn write_formatted(&mut self, text: &str) -> Result<(), Exception> {
        self.request
            .write_formatted(text)
            .map_err(|e| Exception::Internal(e.to_string()))
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), Exception> {
        self.request
            .write(data)
            .map_err(|e| Exception::Internal(e.to_string()))
    }
}

/// gzip压缩一个字节序列。
fn compress(data: &[u8]) -> Result<Vec<u8>, Exception> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Exception::Internal(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Exception::Internal(e.to_string()))
}
