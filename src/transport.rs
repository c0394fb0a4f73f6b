//! 传输层接口。
//!
//! 本核心不实现FastCGI线协议（记录分帧、多路复用），只面向一个抽象的
//! 传输协作者：它为每个被接受的请求提供环境变量、可读的请求体流和可写的
//! 输出流。`write_formatted` 对应传输层的格式化写原语，该原语把 `%` 视为
//! 格式指令，因此响应层写入前必须把字面 `%` 转义为 `%%`。

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// 一个被接受的请求/响应交换单元。
pub trait TransportRequest: Send {
    /// 请求启动时传输层提供的环境，形如 `key=value` 的字符串序列。
    fn environment(&self) -> &[String];

    /// 从请求体流读取最多 `buf.len()` 字节，返回实际读取数。
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// 原样写入输出流。
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// 格式化写原语。`%` 被视为格式指令，`%%` 输出一个字面 `%`。
    fn write_formatted(&mut self, text: &str) -> io::Result<()>;

    /// 完成本次请求的输出流并释放该工作单元。
    fn finish(&mut self);
}

/// 请求的来源。`accept` 阻塞直到新的工作单元到达；返回错误视为致命，
/// 将触发整个工作线程池停机。
pub trait Transport: Send {
    type Request: TransportRequest + 'static;

    fn accept(&mut self) -> io::Result<Self::Request>;
}

/// 进程内传输实现。
///
/// 请求按脚本预先入队，输出被捕获到共享缓冲区，供测试套件和演示二进制
/// 检查。队列耗尽后 `accept` 返回错误，正好用于演练致命accept停机路径。
pub struct MemoryTransport {
    queue: VecDeque<MemoryRequest>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, request: MemoryRequest) {
        self.queue.push_back(request);
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    type Request = MemoryRequest;

    fn accept(&mut self) -> io::Result<MemoryRequest> {
        match self.queue.pop_front() {
            Some(request) => Ok(request),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "transport closed",
            )),
        }
    }
}

/// [`MemoryTransport`] 的请求单元。
///
/// 输出缓冲区和完成标志通过 `Arc` 共享，请求被服务端消费后仍可检查。
pub struct MemoryRequest {
    environment: Vec<String>,
    body: io::Cursor<Vec<u8>>,
    output: Arc<Mutex<Vec<u8>>>,
    finished: Arc<AtomicBool>,
}

impl MemoryRequest {
    pub fn new(environment: Vec<String>, body: Vec<u8>) -> Self {
        Self {
            environment,
            body: io::Cursor::new(body),
            output: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 捕获输出的共享句柄。
    pub fn output_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.output)
    }

    /// 完成标志的共享句柄。
    pub fn finished_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }
}

impl TransportRequest for MemoryRequest {
    fn environment(&self) -> &[String] {
        &self.environment
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut output = self.output.lock().unwrap();
        output.extend_from_slice(data);
        Ok(())
    }

    fn write_formatted(&mut self, text: &str) -> io::Result<()> {
        // 模拟FCGX_FPrintF的格式语义：%%坍缩为一个字面%
        let mut rendered = Vec::with_capacity(text.len());
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' && i + 1 < bytes.len() && bytes[i + 1] == b'%' {
                rendered.push(b'%');
                i += 2;
            } else {
                rendered.push(bytes[i]);
                i += 1;
            }
        }
        let mut output = self.output.lock().unwrap();
        output.extend_from_slice(&rendered);
        Ok(())
    }

    fn finish(&mut self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}
