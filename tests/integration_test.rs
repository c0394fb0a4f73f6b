use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fcgi_api::{Config, Dispatcher, MemoryRequest, MemoryTransport, Server};
use tempfile::NamedTempFile;

/// 构建一个单工作线程的测试配置
fn test_config(extra: &str) -> Config {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "worker_threads = 1\n{}", extra).unwrap();
    Config::from_toml(file.path().to_str().unwrap())
}

fn request_with(entries: &[&str], body: &[u8]) -> MemoryRequest {
    MemoryRequest::new(
        entries.iter().map(|e| e.to_string()).collect(),
        body.to_vec(),
    )
}

/// 运行服务端到队列耗尽，返回捕获的响应文本
fn run_and_capture(
    dispatcher: Dispatcher,
    config: Config,
    request: MemoryRequest,
) -> (String, Arc<AtomicBool>) {
    let output = request.output_handle();
    let finished = request.finished_handle();

    let mut transport = MemoryTransport::new();
    transport.push(request);

    let server = Server::new(transport, dispatcher, None, config);
    server.run();

    let text = String::from_utf8(output.lock().unwrap().clone()).unwrap();
    (text, finished)
}

/// 把响应文本拆为（状态码，标头，响应体）
fn parse_response(response: &str) -> (u16, Vec<(String, String)>, String) {
    let (head, body) = response
        .split_once("\r\n\r\n")
        .unwrap_or((response, ""));

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or("");
    let status_code = status_line
        .strip_prefix("Status: ")
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);

    let mut headers = Vec::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(": ") {
            headers.push((key.to_string(), value.to_string()));
        }
    }

    (status_code, headers, body.to_string())
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// 完整链路：POST请求被路由到处理器，响应体回显请求体
    #[test]
    fn test_dispatch_end_to_end() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("echo", |_thread_id, writer, view, _details| {
            let body = String::from_utf8_lossy(view.body()).to_string();
            writer.send_success(200, &body, None, None, None, false)
        });

        let request = request_with(
            &[
                "REQUEST_METHOD=POST",
                "REQUEST_URI=/catramms/1.0.1/echo",
                "QUERY_STRING=x-api-method=echo",
                "CONTENT_LENGTH=13",
            ],
            b"{\"key\":\"val\"}",
        );

        let (text, finished) = run_and_capture(dispatcher, test_config(""), request);
        let (status, headers, body) = parse_response(&text);

        assert_eq!(status, 200);
        assert_eq!(
            header(&headers, "Content-Type"),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(header(&headers, "Content-Length"), Some("13"));
        assert_eq!(body, "{\"key\":\"val\"}");
        assert!(finished.load(Ordering::SeqCst));
    }

    /// 未注册的x-api-method在宽容模式下收到500响应
    #[test]
    fn test_unmanaged_method_tolerant_mode() {
        let request = request_with(
            &["REQUEST_METHOD=GET", "QUERY_STRING=x-api-method=ghost"],
            b"",
        );

        let (text, finished) = run_and_capture(Dispatcher::new(), test_config(""), request);
        let (status, _headers, body) = parse_response(&text);

        assert_eq!(status, 500);
        assert!(body.contains("No API method managed for ghost"));
        assert!(finished.load(Ordering::SeqCst));
    }

    /// 声明长度超限的请求收到500响应，请求体不被读取
    #[test]
    fn test_content_too_large() {
        let request = request_with(
            &[
                "REQUEST_METHOD=POST",
                "QUERY_STRING=x-api-method=echo",
                "CONTENT_LENGTH=64",
            ],
            &[0u8; 64],
        );

        let config = test_config("max_content_length = 32");
        let (text, finished) = run_and_capture(Dispatcher::new(), config, request);
        let (status, _headers, body) = parse_response(&text);

        assert_eq!(status, 500);
        assert!(body.contains("ContentLength too long"));
        assert!(body.contains("contentLength: 64"));
        assert!(body.contains("maxContentLength: 32"));
        assert!(finished.load(Ordering::SeqCst));
    }

    /// 处理器重复发送响应：第二次被拒绝，输出只包含第一次的内容
    #[test]
    fn test_double_send_guard() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("double", |_thread_id, writer, _view, _details| {
            writer.send_success(200, "first", None, None, None, false)?;
            writer.send_error(500, "second")
        });

        let request = request_with(
            &["REQUEST_METHOD=GET", "QUERY_STRING=x-api-method=double"],
            b"",
        );

        let (text, _finished) = run_and_capture(dispatcher, test_config(""), request);
        let (status, _headers, body) = parse_response(&text);

        assert_eq!(status, 200);
        assert_eq!(body, "first");
        assert!(!text.contains("second"));
    }

    /// 响应体中的%原样到达客户端，Content-Length与可见字节一致
    #[test]
    fn test_percent_body_is_transmitted_literally() {
        let payload = "{\"progress\":\"87%\",\"rate\":\"3%%\"}";
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("progress", move |_thread_id, writer, _view, _details| {
            writer.send_success(200, payload, None, None, None, false)
        });

        let request = request_with(
            &["REQUEST_METHOD=GET", "QUERY_STRING=x-api-method=progress"],
            b"",
        );

        let (text, _finished) = run_and_capture(dispatcher, test_config(""), request);
        let (status, headers, body) = parse_response(&text);

        assert_eq!(status, 200);
        assert_eq!(body, payload);
        assert_eq!(
            header(&headers, "Content-Length"),
            Some(payload.len().to_string().as_str())
        );
    }

    /// 重复的查询参数键，处理器看到最后一次出现的值
    #[test]
    fn test_duplicate_query_key_last_wins() {
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_in_handler = Arc::clone(&seen);

        let mut dispatcher = Dispatcher::new();
        dispatcher.register("inspect", move |_thread_id, writer, view, _details| {
            let value: String = view.query_parameter("tag", String::new(), true)?;
            *seen_in_handler.lock().unwrap() = value;
            writer.send_success(200, "{}", None, None, None, false)
        });

        let request = request_with(
            &[
                "REQUEST_METHOD=GET",
                "QUERY_STRING=x-api-method=inspect&tag=first&tag=last",
            ],
            b"",
        );

        let (_text, _finished) = run_and_capture(dispatcher, test_config(""), request);

        assert_eq!(*seen.lock().unwrap(), "last");
    }

    /// 要求压缩的请求收到gzip响应体与X-CompressedBody标头
    #[test]
    fn test_compressed_response_end_to_end() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("big", |_thread_id, writer, view, _details| {
            let body = "x".repeat(4096);
            writer.send_success(
                200,
                &body,
                None,
                None,
                None,
                view.response_body_compressed(),
            )
        });

        let request = request_with(
            &[
                "REQUEST_METHOD=GET",
                "QUERY_STRING=x-api-method=big",
                "HTTP_X_RESPONSEBODYCOMPRESSED=true",
            ],
            b"",
        );

        let output = request.output_handle();
        let mut transport = MemoryTransport::new();
        transport.push(request);
        let server = Server::new(transport, dispatcher, None, test_config(""));
        server.run();

        let raw = output.lock().unwrap().clone();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.contains("X-CompressedBody: true\r\n"));

        let head_end = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let declared: usize = text
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length: "))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(declared, raw.len() - head_end);
        // 压缩后的长度应明显小于原始长度
        assert!(declared < 4096);
    }

    /// 队列耗尽后accept失败，所有工作线程停机，run返回
    #[test]
    fn test_fatal_accept_shuts_down_pool() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("status", |_thread_id, writer, _view, _details| {
            writer.send_success(200, "{\"status\":\"running\"}", None, None, None, false)
        });

        let mut transport = MemoryTransport::new();
        let mut flags = Vec::new();
        for _ in 0..4 {
            let request = request_with(
                &[
                    "REQUEST_METHOD=GET",
                    "REQUEST_URI=/catramms/1.0.1/status",
                    "QUERY_STRING=x-api-method=status",
                ],
                b"",
            );
            flags.push(request.finished_handle());
            transport.push(request);
        }

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "worker_threads = 3").unwrap();
        let config = Config::from_toml(file.path().to_str().unwrap());

        let server = Server::new(transport, dispatcher, None, config);
        // run返回本身就证明了停机的传播
        server.run();

        for flag in flags {
            assert!(flag.load(Ordering::SeqCst));
        }
    }
}
