//! Destinations for reported lines.
//!
//! Sinks are best effort: a failed write is logged and dropped, it never reaches the scheduler.

use {
    chrono::Utc,
    log::warn,
    rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS},
    std::{
        fs::{File, OpenOptions},
        io::{self, Write},
        path::{Path, PathBuf},
        time::Duration,
    },
    tokio::time,
};

pub trait Sink {
    fn write_lines(&mut self, lines: &[String]);
}

impl Sink for Vec<String> {
    fn write_lines(&mut self, lines: &[String]) {
        self.extend_from_slice(lines);
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write_lines(&mut self, lines: &[String]) {
        (**self).write_lines(lines)
    }
}

/// The serial-console equivalent: one line per reading on stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn write_lines(&mut self, lines: &[String]) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(out, "{}", line))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            warn!("Console write failed: {}", e);
        }
    }
}

/// Append-only log store; every line is prefixed with its RFC 3339 wall-clock time.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: File,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    fn append(&mut self, lines: &[String]) -> io::Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut buf = String::new();
        for line in lines {
            buf.push_str(&now);
            buf.push(' ');
            buf.push_str(line);
            buf.push('\n');
        }
        self.file.write_all(buf.as_bytes())?;
        self.file.flush()
    }
}

impl Sink for FileSink {
    fn write_lines(&mut self, lines: &[String]) {
        if let Err(e) = self.append(lines) {
            warn!("Failed to append to {}: {}", self.path.display(), e);
        }
    }
}

/// Publishes each line to `<id>/airq` and marks the device online at `<id>/airq/online`.
pub struct MqttSink {
    client: AsyncClient,
    id: String,
}

impl MqttSink {
    /// The returned event loop must be driven (see [`drive`](Self::drive)) for messages to leave.
    pub fn connect(id: &str, host: &str, port: u16) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(id, host, port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, eventloop) = AsyncClient::new(options, 64);
        (
            Self {
                client,
                id: id.to_string(),
            },
            eventloop,
        )
    }

    pub async fn drive(mut eventloop: EventLoop) {
        loop {
            if let Err(e) = eventloop.poll().await {
                warn!("MQTT connection error: {}", e);
                time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    fn publish(&self, topic: String, payload: impl Into<Vec<u8>>) {
        if let Err(e) = self
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
        {
            warn!("MQTT publish dropped: {}", e);
        }
    }
}

impl Sink for MqttSink {
    fn write_lines(&mut self, lines: &[String]) {
        self.publish(format!("{}/airq/online", self.id), b"true".to_vec());
        for line in lines {
            self.publish(format!("{}/airq", self.id), line.as_bytes().to_vec());
        }
    }
}

/// Writes every batch to each inner sink in order.
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Box<dyn Sink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl Sink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for Fanout {
    fn write_lines(&mut self, lines: &[String]) {
        for sink in &mut self.sinks {
            sink.write_lines(lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{cell::RefCell, fs, rc::Rc},
    };

    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<String>>>);

    impl Sink for Shared {
        fn write_lines(&mut self, lines: &[String]) {
            self.0.borrow_mut().extend_from_slice(lines);
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let (a, b) = (Shared::default(), Shared::default());
        let mut fanout = Fanout::new();
        fanout.push(a.clone());
        fanout.push(b.clone());
        fanout.write_lines(&lines(&["MQ2: 0.41 V"]));
        assert_eq!(fanout.len(), 2);
        assert_eq!(*a.0.borrow(), ["MQ2: 0.41 V"]);
        assert_eq!(*b.0.borrow(), ["MQ2: 0.41 V"]);
    }

    #[test]
    fn file_sink_appends_timestamped_lines() {
        let path = std::env::temp_dir().join(format!("airq-sink-{}.log", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut sink = FileSink::open(&path).unwrap();
        sink.write_lines(&lines(&["TGS2600: 1.23 V", "SGP41: ERROR Timeout"]));
        sink.write_lines(&lines(&["TGS2600: 1.25 V"]));

        let content = fs::read_to_string(&path).unwrap();
        let written: Vec<_> = content.lines().collect();
        assert_eq!(written.len(), 3);
        assert!(written[0].ends_with(" TGS2600: 1.23 V"));
        assert!(written[1].ends_with(" SGP41: ERROR Timeout"));
        let stamp = written[2].split(' ').next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<String> = Vec::new();
        sink.write_lines(&lines(&["a", "b"]));
        sink.write_lines(&lines(&["c"]));
        assert_eq!(sink, ["a", "b", "c"]);
    }
}
