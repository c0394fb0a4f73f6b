// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 鉴权安全回归测试套件
    //!
    //! 该模块验证Basic鉴权门禁对畸形与恶意凭证的防御能力。
    //! 覆盖范围包括：
    //! - 凭证缺失与格式混淆（大小写、非法base64、缺少冒号）
    //! - 错误响应的信息泄露（失败细节只允许进入服务端日志）
    //! - 鉴权器携带状态码的保真传递
    //! - 免鉴权路径的放行

    use std::io::Write;
    use std::sync::Arc;

    use fcgi_api::{
        Authenticator, AuthorizationDetails, Config, Dispatcher, Exception, MemoryRequest,
        MemoryTransport, RequestView, Server,
    };
    use tempfile::NamedTempFile;

    /// 接受固定凭证admin/secret的鉴权器
    struct FixedAuthenticator;

    impl Authenticator for FixedAuthenticator {
        fn check_authorization(
            &self,
            _thread_id: &str,
            _view: &RequestView,
            username: &str,
            password: &str,
        ) -> Result<AuthorizationDetails, Exception> {
            if username == "admin" && password == "secret" {
                Ok(Arc::new(username.to_string()))
            } else {
                // 失败细节只进入服务端日志，绝不能出现在响应里
                Err(Exception::Internal(format!(
                    "password mismatch for user {}",
                    username
                )))
            }
        }
    }

    fn single_thread_config() -> Config {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "worker_threads = 1").unwrap();
        Config::from_toml(file.path().to_str().unwrap())
    }

    fn dispatcher_with_whoami() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("whoami", |_thread_id, writer, _view, details| {
            let username = details
                .and_then(|d| d.downcast_ref::<String>())
                .cloned()
                .unwrap_or_else(|| "anonymous".to_string());
            writer.send_success(200, &username, None, None, None, false)
        });
        dispatcher
    }

    /// 通过服务循环发送一个带指定Authorization标头的请求
    fn run_with_authorization(
        authenticator: Arc<dyn Authenticator>,
        authorization: Option<&str>,
    ) -> String {
        let mut environment = vec![
            "REQUEST_METHOD=GET".to_string(),
            "REQUEST_URI=/catramms/1.0.1/whoami".to_string(),
            "QUERY_STRING=x-api-method=whoami".to_string(),
        ];
        if let Some(authorization) = authorization {
            environment.push(format!("HTTP_AUTHORIZATION={}", authorization));
        }

        let request = MemoryRequest::new(environment, vec![]);
        let output = request.output_handle();

        let mut transport = MemoryTransport::new();
        transport.push(request);

        let server = Server::new(
            transport,
            dispatcher_with_whoami(),
            Some(authenticator),
            single_thread_config(),
        );
        server.run();

        let raw = output.lock().unwrap().clone();
        String::from_utf8(raw).unwrap()
    }

    /// ## 攻击向量：凭证缺失
    /// 没有Authorization标头的请求必须被拒绝，不能落入处理器。
    #[test]
    fn test_missing_authorization_header() {
        let text = run_with_authorization(Arc::new(FixedAuthenticator), None);

        assert!(text.starts_with("Status: 401 Unauthorized\r\n"));
        assert!(!text.contains("anonymous"));
    }

    /// ## 攻击向量：方案混淆
    /// 方案前缀区分大小写，小写的basic不被接受。
    #[test]
    fn test_lowercase_scheme_is_rejected() {
        // base64("admin:secret")
        let text = run_with_authorization(
            Arc::new(FixedAuthenticator),
            Some("basic YWRtaW46c2VjcmV0"),
        );

        assert!(text.starts_with("Status: 401 Unauthorized\r\n"));
    }

    /// ## 攻击向量：非法base64载荷
    #[test]
    fn test_invalid_base64_is_rejected() {
        let text = run_with_authorization(
            Arc::new(FixedAuthenticator),
            Some("Basic @@@not-base64@@@"),
        );

        assert!(text.starts_with("Status: 401 Unauthorized\r\n"));
    }

    /// ## 攻击向量：缺少冒号分隔符
    #[test]
    fn test_missing_colon_is_rejected() {
        // base64("adminsecret")
        let text = run_with_authorization(
            Arc::new(FixedAuthenticator),
            Some("Basic YWRtaW5zZWNyZXQ="),
        );

        assert!(text.starts_with("Status: 401 Unauthorized\r\n"));
    }

    /// ## 信息泄露防护
    /// 鉴权器拒绝凭证时，响应体只包含标准短语，内部失败细节不得出现。
    #[test]
    fn test_rejection_leaks_no_detail() {
        // base64("admin:wrong")
        let text = run_with_authorization(
            Arc::new(FixedAuthenticator),
            Some("Basic YWRtaW46d3Jvbmc="),
        );

        assert!(text.starts_with("Status: 401 Unauthorized\r\n"));
        assert!(text.ends_with("Unauthorized"));
        assert!(!text.contains("password mismatch"));
        assert!(!text.contains("admin"));
    }

    /// 鉴权器携带的非401状态码被原样发送
    #[test]
    fn test_carried_status_code_is_preserved() {
        struct Forbid;
        impl Authenticator for Forbid {
            fn check_authorization(
                &self,
                _thread_id: &str,
                _view: &RequestView,
                _username: &str,
                _password: &str,
            ) -> Result<AuthorizationDetails, Exception> {
                Err(Exception::Unauthorized(403))
            }
        }

        let text =
            run_with_authorization(Arc::new(Forbid), Some("Basic YWRtaW46c2VjcmV0"));

        assert!(text.starts_with("Status: 403 Forbidden\r\n"));
        assert!(text.ends_with("Forbidden"));
    }

    /// 免鉴权路径放行，处理器收到空的授权详情
    #[test]
    fn test_auth_not_required_bypass() {
        struct OpenStatus;
        impl Authenticator for OpenStatus {
            fn is_auth_required(&self, view: &RequestView) -> bool {
                !view.uri().ends_with("/whoami")
            }
            fn check_authorization(
                &self,
                _thread_id: &str,
                _view: &RequestView,
                _username: &str,
                _password: &str,
            ) -> Result<AuthorizationDetails, Exception> {
                unreachable!()
            }
        }

        let text = run_with_authorization(Arc::new(OpenStatus), None);

        assert!(text.starts_with("Status: 200 OK\r\n"));
        assert!(text.ends_with("anonymous"));
    }

    /// 合法凭证通过，处理器收到鉴权器装配的授权详情
    #[test]
    fn test_valid_credentials_reach_handler() {
        let text = run_with_authorization(
            Arc::new(FixedAuthenticator),
            Some("Basic YWRtaW46c2VjcmV0"),
        );

        assert!(text.starts_with("Status: 200 OK\r\n"));
        assert!(text.ends_with("admin"));
    }
}
