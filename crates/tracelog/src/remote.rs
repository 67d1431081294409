use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Builder;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, timeout, Duration, Instant};
use tracing::{debug, error, warn};

use crate::handler::{Handler, HandlerKind};
use crate::logstash::LogstashFormatter;
use crate::record::LogRecord;

/// 远程发送配置
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    pub host: String,
    pub port: u16,
    /// 缓冲达到该数量时立即发送
    pub max_buffer_size: usize,
    pub flush_interval: Duration,
    /// 队列上限：入队通道满时丢弃新记录，缓冲满时丢弃最旧的记录
    pub max_queue_size: usize,
    pub connect_timeout: Duration,
    /// 发送失败后的首次重试间隔，之后每次翻倍
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl ShipperConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_buffer_size: 50,
            flush_interval: Duration::from_secs(5),
            max_queue_size: 10_000,
            connect_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size.max(1);
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// 一次强制发送最长的等待时间：连接 + 写入
    fn flush_timeout(&self) -> Duration {
        self.connect_timeout * 2 + Duration::from_secs(1)
    }
}

/// 一次强制发送的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub shipped: usize,
    /// 发送失败、仍留在缓冲中的记录数
    pub pending: usize,
    /// 累计丢弃的记录数
    pub dropped: u64,
}

enum Command {
    Flush(std_mpsc::Sender<FlushReport>),
}

/// 异步发送到 Logstash 的处理器
///
/// `emit` 只做非阻塞入队；后台线程按批次或定时把记录写到 TCP 连接。
/// 处理器被丢弃后队列关闭，后台线程发送剩余记录后退出。
pub struct RemoteHandler {
    formatter: LogstashFormatter,
    sender: mpsc::Sender<String>,
    control: mpsc::UnboundedSender<Command>,
    dropped: Arc<AtomicU64>,
    flush_timeout: Duration,
    endpoint: String,
}

impl RemoteHandler {
    pub fn new(config: ShipperConfig, formatter: LogstashFormatter) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_queue_size.max(1));
        let (control, control_receiver) = mpsc::unbounded_channel();
        let dropped = Arc::new(AtomicU64::new(0));
        let endpoint = format!("{}:{}", config.host, config.port);
        let flush_timeout = config.flush_timeout();

        spawn_shipper(LogShipper::new(
            config,
            receiver,
            control_receiver,
            dropped.clone(),
        ));

        Self {
            formatter,
            sender,
            control,
            dropped,
            flush_timeout,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 累计丢弃的记录数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 立即发送已入队的全部记录并等待结果
    ///
    /// 后台线程已退出或超时时返回 None。
    pub fn flush_now(&self) -> Option<FlushReport> {
        let (ack, done) = std_mpsc::channel();
        self.control.send(Command::Flush(ack)).ok()?;
        done.recv_timeout(self.flush_timeout).ok()
    }
}

impl Handler for RemoteHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Remote
    }

    fn emit(&self, record: &LogRecord) {
        let line = match self.formatter.to_line(record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to format log record: {}", e);
                return;
            }
        };

        match self.sender.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // 后台线程已退出时静默丢弃
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn flush(&self) {
        if let Some(report) = self.flush_now() {
            if report.pending > 0 {
                warn!(
                    "{} log entries for {} could not be shipped",
                    report.pending, self.endpoint
                );
            }
        }
    }
}

// 发送器始终运行在独立线程上，flush 的同步等待不会卡住调用方所在的运行时
fn spawn_shipper(shipper: LogShipper) {
    let spawned = std::thread::Builder::new()
        .name("tracelog-shipper".to_string())
        .spawn(move || {
            match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(shipper.run()),
                Err(e) => error!("Failed to start log shipper runtime: {}", e),
            }
        });

    if let Err(e) = spawned {
        error!("Failed to spawn log shipper thread: {}", e);
    }
}

/// 重连退避
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    retry_at: Option<Instant>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            retry_at: None,
        }
    }

    fn ready(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    /// 记录一次失败，返回本次等待时间
    fn fail(&mut self) -> Duration {
        let delay = self.current;
        self.retry_at = Some(Instant::now() + delay);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
        self.retry_at = None;
    }
}

struct LogShipper {
    config: ShipperConfig,
    receiver: mpsc::Receiver<String>,
    control: mpsc::UnboundedReceiver<Command>,
    buffer: VecDeque<String>,
    connection: Option<TcpStream>,
    backoff: Backoff,
    dropped: Arc<AtomicU64>,
    reported_dropped: u64,
}

impl LogShipper {
    fn new(
        config: ShipperConfig,
        receiver: mpsc::Receiver<String>,
        control: mpsc::UnboundedReceiver<Command>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            buffer: VecDeque::with_capacity(config.max_buffer_size),
            backoff: Backoff::new(config.retry_delay, config.max_retry_delay),
            config,
            receiver,
            control,
            connection: None,
            dropped,
            reported_dropped: 0,
        }
    }

    async fn run(mut self) {
        let mut ticker = interval(self.config.flush_interval);

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Some(line) => {
                        self.push(line);
                        if self.buffer.len() >= self.config.max_buffer_size {
                            self.flush(false).await;
                        }
                    }
                    None => {
                        self.flush(true).await;
                        break;
                    }
                },
                Some(command) = self.control.recv() => match command {
                    Command::Flush(ack) => {
                        self.drain();
                        let shipped = self.flush(true).await;
                        let _ = ack.send(FlushReport {
                            shipped,
                            pending: self.buffer.len(),
                            dropped: self.dropped.load(Ordering::Relaxed),
                        });
                    }
                },
                _ = ticker.tick() => {
                    self.flush(false).await;
                }
            }
        }

        debug!("Log shipper for {}:{} stopped", self.config.host, self.config.port);
    }

    fn push(&mut self, line: String) {
        if self.buffer.len() >= self.config.max_queue_size {
            self.buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.buffer.push_back(line);
    }

    // 取出通道中已有的全部记录
    fn drain(&mut self) {
        while let Ok(line) = self.receiver.try_recv() {
            self.push(line);
        }
    }

    /// 发送缓冲区，返回发送的条数；`force` 忽略退避等待
    async fn flush(&mut self, force: bool) -> usize {
        self.report_dropped();

        if self.buffer.is_empty() || !(force || self.backoff.ready()) {
            return 0;
        }

        match self.write_buffer().await {
            Ok(()) => {
                let shipped = self.buffer.len();
                debug!("Shipped {} log entries", shipped);
                self.buffer.clear();
                self.backoff.reset();
                shipped
            }
            Err(e) => {
                // 连接失效，退避后重连
                self.connection = None;
                let delay = self.backoff.fail();
                warn!(
                    "Failed to ship {} log entries to {}:{}: {}; retrying in {:?}",
                    self.buffer.len(),
                    self.config.host,
                    self.config.port,
                    e,
                    delay
                );
                0
            }
        }
    }

    fn report_dropped(&mut self) {
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > self.reported_dropped {
            warn!(
                "Dropped {} log entries (queue full)",
                dropped - self.reported_dropped
            );
            self.reported_dropped = dropped;
        }
    }

    async fn write_buffer(&mut self) -> io::Result<()> {
        let limit = self.config.connect_timeout;
        timeout(limit, self.write_all())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?
    }

    async fn write_all(&mut self) -> io::Result<()> {
        if self.connection.is_none() {
            let address = (self.config.host.as_str(), self.config.port);
            let stream = timeout(self.config.connect_timeout, TcpStream::connect(address))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
            self.connection = Some(stream);
        }

        let Some(stream) = self.connection.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };

        for line in &self.buffer {
            stream.write_all(line.as_bytes()).await?;
        }
        stream.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Severity;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    fn handler_for(port: u16, config: impl FnOnce(ShipperConfig) -> ShipperConfig) -> RemoteHandler {
        RemoteHandler::new(
            config(ShipperConfig::new("127.0.0.1", port).with_flush_interval(Duration::from_secs(60))),
            LogstashFormatter::new("rust", "tests"),
        )
    }

    fn read_lines(listener: &TcpListener, count: usize) -> Vec<serde_json::Value> {
        let (socket, _) = listener.accept().unwrap();
        BufReader::new(socket)
            .lines()
            .take(count)
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect()
    }

    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_remaining_records_shipped_on_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handler = handler_for(port, |config| config);
        assert_eq!(handler.endpoint(), format!("127.0.0.1:{}", port));

        handler.emit(&LogRecord::new(Severity::WARNING, "first"));
        handler.emit(&LogRecord::new(Severity::ERROR, "second"));
        drop(handler);

        let lines = read_lines(&listener, usize::MAX);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["message"], "first");
        assert_eq!(lines[1]["level"], "ERROR");
        assert_eq!(lines[1]["@metadata"]["beat"], "tests");
    }

    #[test]
    fn test_full_buffer_ships_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handler = handler_for(port, |config| config.with_max_buffer_size(1));
        handler.emit(&LogRecord::new(Severity::INFO, "now"));

        let lines = read_lines(&listener, 1);
        assert_eq!(lines[0]["message"], "now");
    }

    #[test]
    fn test_flush_ships_buffered_records() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handler = handler_for(port, |config| config);
        handler.emit(&LogRecord::new(Severity::WARNING, "queued one"));
        handler.emit(&LogRecord::new(Severity::WARNING, "queued two"));

        let report = handler.flush_now().unwrap();
        assert_eq!(report.shipped, 2);
        assert_eq!(report.pending, 0);

        // 处理器仍然存活，记录已经写出
        let lines = read_lines(&listener, 2);
        assert_eq!(lines[0]["message"], "queued one");
        assert_eq!(lines[1]["message"], "queued two");
    }

    #[test]
    fn test_queue_bounded_when_unreachable() {
        let handler = handler_for(closed_port(), |config| config.with_max_queue_size(8));

        for i in 0..1000 {
            handler.emit(&LogRecord::new(Severity::INFO, format!("entry {}", i)));
        }

        let report = handler.flush_now().unwrap();
        assert_eq!(report.shipped, 0);
        assert!(report.pending <= 8);
        assert_eq!(report.pending as u64 + report.dropped, 1000);
        assert_eq!(handler.dropped(), report.dropped);
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(4));
        assert!(backoff.ready());

        assert_eq!(backoff.fail(), Duration::from_secs(1));
        assert!(!backoff.ready());
        assert_eq!(backoff.fail(), Duration::from_secs(2));
        assert_eq!(backoff.fail(), Duration::from_secs(4));
        assert_eq!(backoff.fail(), Duration::from_secs(4));

        backoff.reset();
        assert!(backoff.ready());
        assert_eq!(backoff.fail(), Duration::from_secs(1));
    }

    #[test]
    fn test_handler_without_runtime() {
        let handler = handler_for(closed_port(), |config| config);
        assert_eq!(handler.kind(), HandlerKind::Remote);
        handler.emit(&LogRecord::new(Severity::INFO, "nobody listens"));
        handler.flush();
    }
}
