// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务循环模块
//!
//! 该模块实现固定大小的工作线程池。每个工作线程独立执行
//! 接受请求 -> 构建视图 -> 鉴权 -> 分发 -> 收尾 的完整序列：
//! - `accept` 调用由共享互斥锁串行化，锁内不做任何请求处理。
//! - 停机标志在拿锁前后各检查一次，避免停机期间的多余阻塞。
//! - `accept` 返回错误视为致命，置位停机标志并退出本线程；
//!   其余线程在下一次循环时观察到标志后跟随退出。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use log::{error, info, trace};

use crate::auth::{self, Authenticator};
use crate::config::Config;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::param::{self, API_METHOD_PARAMETER};
use crate::request::RequestView;
use crate::response::ResponseWriter;
use crate::transport::{Transport, TransportRequest};

/// 请求处理服务端。
///
/// 持有传输层、处理器注册表与可选的鉴权器；`run` 启动工作线程池并
/// 阻塞到所有线程退出。
pub struct Server<T: Transport + 'static> {
    transport: Arc<Mutex<T>>,
    dispatcher: Arc<Dispatcher>,
    authenticator: Option<Arc<dyn Authenticator>>,
    config: Config,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport + 'static> Server<T> {
    pub fn new(
        transport: T,
        dispatcher: Dispatcher,
        authenticator: Option<Arc<dyn Authenticator>>,
        config: Config,
    ) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            dispatcher: Arc::new(dispatcher),
            authenticator,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 停机标志的共享句柄，供外部组件（信号处理等）触发停机。
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// 请求停机。正在处理中的请求会完成，工作线程随后退出。
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// 启动工作线程池并阻塞到所有线程退出。
    pub fn run(&self) {
        let worker_threads = self.config.worker_threads().max(1);
        info!("服务启动，工作线程数：{}", worker_threads);

        let mut workers = Vec::with_capacity(worker_threads);
        for _ in 0..worker_threads {
            let transport = Arc::clone(&self.transport);
            let dispatcher = Arc::clone(&self.dispatcher);
            let authenticator = self.authenticator.clone();
            let config = self.config.clone();
            let shutdown = Arc::clone(&self.shutdown);

            workers.push(thread::spawn(move || {
                worker_loop(transport, dispatcher, authenticator, config, shutdown);
            }));
        }

        for worker in workers {
            if worker.join().is_err() {
                error!("某个工作线程发生了panic");
            }
        }

        info!("服务已停止");
    }
}

/// 单个工作线程的主循环。
fn worker_loop<T: Transport>(
    transport: Arc<Mutex<T>>,
    dispatcher: Arc<Dispatcher>,
    authenticator: Option<Arc<dyn Authenticator>>,
    config: Config,
    shutdown: Arc<AtomicBool>,
) {
    let thread_id = format!("{:?}", thread::current().id());
    let mut request_identifier: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        request_identifier += 1;

        let accepted = {
            trace!("[{}]等待接受请求, requestIdentifier: {}", thread_id, request_identifier);
            let mut guard = match transport.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            // 拿到锁之后再确认一次，避免处理停机期间残留的工作单元
            if shutdown.load(Ordering::SeqCst) {
                continue;
            }

            guard.accept()
        };

        let mut request = match accepted {
            Ok(request) => request,
            Err(e) => {
                // accept失败是致命的，整个线程池停机
                error!("[{}]accept失败，触发停机: {}", thread_id, e);
                shutdown.store(true, Ordering::SeqCst);
                continue;
            }
        };

        process_request(
            &mut request,
            &dispatcher,
            authenticator.as_deref(),
            &config,
            &thread_id,
            request_identifier,
        );
    }

    info!("[{}]工作线程退出", thread_id);
}

/// 处理单个已接受的请求。
///
/// 无论哪个阶段失败，离开本函数时请求的输出都已完成：
/// - 视图构建失败：发送携带错误描述的 500 响应。
/// - 鉴权失败：发送携带标准短语的错误响应，不泄露失败细节。
/// - 处理器失败：只记录日志，由兜底收尾关闭输出流。
fn process_request(
    request: &mut dyn TransportRequest,
    dispatcher: &Dispatcher,
    authenticator: Option<&dyn Authenticator>,
    config: &Config,
    thread_id: &str,
    request_identifier: u64,
) {
    let view = match RequestView::build(request, config.max_content_length(), request_identifier) {
        Ok(view) => view,
        Err(e) => {
            error!("[{}]请求视图构建失败: {}", thread_id, e);
            let message = e.to_string();
            let mut writer = ResponseWriter::new(request, thread_id, request_identifier, "", "");
            if let Err(e) = writer.send_error(e.status_code(), &message) {
                error!("[{}]发送错误响应失败: {}", thread_id, e);
            }
            writer.finish_if_needed();
            return;
        }
    };

    let authorization_details = match authenticator {
        Some(authenticator) => match auth::authorize(authenticator, thread_id, &view) {
            Ok(details) => details,
            Err(e) => {
                let code = e.status_code();
                // 只回送标准短语，失败细节留在服务端日志里
                let mut writer = ResponseWriter::new(
                    request,
                    thread_id,
                    request_identifier,
                    view.uri(),
                    view.method(),
                );
                if let Err(e) = writer.send_error(code, param::standard_message(code)) {
                    error!("[{}]发送错误响应失败: {}", thread_id, e);
                }
                writer.finish_if_needed();
                return;
            }
        },
        None => None,
    };

    let start = Instant::now();
    {
        let mut writer = ResponseWriter::new(
            request,
            thread_id,
            request_identifier,
            view.uri(),
            view.method(),
        );

        match dispatcher.dispatch(
            thread_id,
            &mut writer,
            &view,
            authorization_details.as_ref(),
            config.exception_if_not_managed(),
        ) {
            Ok(DispatchOutcome::Handled) => {}
            Ok(DispatchOutcome::NotManaged) => {
                // 宽容模式：未被管理的请求由服务循环统一回送500
                let method = view
                    .query_parameter(API_METHOD_PARAMETER, String::new(), false)
                    .unwrap_or_default();
                let detail = if method.is_empty() {
                    format!(
                        "request is not managed because '{}' is missing",
                        API_METHOD_PARAMETER
                    )
                } else {
                    format!("No API method managed for {}", method)
                };
                if let Err(e) = writer.send_error(500, &detail) {
                    error!("[{}]发送错误响应失败: {}", thread_id, e);
                }
            }
            Err(e) => {
                error!(
                    "[{}]请求处理失败, requestIdentifier: {}, requestURI: {}, exception: {}",
                    thread_id,
                    request_identifier,
                    view.uri(),
                    e
                );
            }
        }

        writer.finish_if_needed();
    }

    if !view.uri().ends_with("/status") {
        let method = view
            .query_parameter(API_METHOD_PARAMETER, String::new(), false)
            .unwrap_or_default();
        info!(
            "[{}]请求处理完成, requestIdentifier: {}, clientIPAddress: @{}@, method: @{}@, requestURI: {}, duration (millisecs): @{}@",
            thread_id,
            request_identifier,
            view.client_ip_address(),
            method,
            view.uri(),
            start.elapsed().as_millis()
        );
    }
}
