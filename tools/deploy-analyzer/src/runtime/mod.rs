use crate::errors::AnalyzerError;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Upper bound on how long `run` blocks before the child is killed.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn sleep_until(&self, deadline: SystemTime) -> Result<(), AnalyzerError>;

    fn sleep_for(&self, duration: Duration) -> Result<(), AnalyzerError> {
        self.sleep_until(self.now() + duration)
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Runs the program to completion or until `request.timeout` expires.
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, AnalyzerError>;
}

pub trait HttpTransport: Send + Sync {
    fn get(&self, request: HttpRequest) -> Result<HttpResponse, AnalyzerError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, AnalyzerError>;
}

pub trait Terminal: Send + Sync {
    fn stdin_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), AnalyzerError>;
    fn prompt(&self, question: &str) -> Result<String, AnalyzerError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep_until(&self, deadline: SystemTime) -> Result<(), AnalyzerError> {
        let now = SystemTime::now();
        if let Ok(duration) = deadline.duration_since(now) {
            std::thread::sleep(duration);
        }
        Ok(())
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, AnalyzerError> {
        std::fs::read_to_string(path)
            .map_err(|e| AnalyzerError::Io(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Default)]
pub struct ProductionProcessRunner;

impl ProcessRunner for ProductionProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, AnalyzerError> {
        let mut child = std::process::Command::new(&request.program)
            .args(&request.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    AnalyzerError::MissingExecutable(request.program.clone())
                }
                _ => AnalyzerError::Process(e.to_string()),
            })?;

        let Some(limit) = request.timeout else {
            let output = child
                .wait_with_output()
                .map_err(|e| AnalyzerError::Process(e.to_string()))?;
            return Ok(ProcessOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        };

        // Pipes drain on their own threads so a chatty child cannot block on
        // a full pipe while the deadline is polled.
        let stdout = spawn_pipe_reader(child.stdout.take());
        let stderr = spawn_pipe_reader(child.stderr.take());
        let deadline = Instant::now() + limit;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AnalyzerError::Timeout {
                        what: request.program,
                        seconds: limit.as_secs(),
                    });
                }
                Ok(None) => std::thread::sleep(PROCESS_POLL_INTERVAL),
                Err(e) => return Err(AnalyzerError::Process(e.to_string())),
            }
        };

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: join_pipe_reader(stdout),
            stderr: join_pipe_reader(stderr),
        })
    }
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join_pipe_reader(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
        .unwrap_or_default()
}

pub struct ProductionHttpTransport {
    client: reqwest::blocking::Client,
}

impl ProductionHttpTransport {
    pub fn new() -> Result<Self, AnalyzerError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("deploy-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalyzerError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ProductionHttpTransport {
    fn get(&self, request: HttpRequest) -> Result<HttpResponse, AnalyzerError> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                AnalyzerError::Timeout {
                    what: request.url.clone(),
                    seconds: request.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                }
            } else {
                AnalyzerError::Http(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response
            .text()
            .map_err(|e| AnalyzerError::Http(e.to_string()))?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdin_is_tty(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdin())
    }

    fn write_line(&self, line: &str) -> Result<(), AnalyzerError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| AnalyzerError::Io(e.to_string()))
    }

    fn prompt(&self, question: &str) -> Result<String, AnalyzerError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        write!(out, "{question}").map_err(|e| AnalyzerError::Io(e.to_string()))?;
        out.flush().map_err(|e| AnalyzerError::Io(e.to_string()))?;
        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .map_err(|e| AnalyzerError::Io(e.to_string()))?;
        Ok(answer.trim().to_string())
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub http: Arc<dyn HttpTransport>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Result<Self, AnalyzerError> {
        Ok(Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner),
            http: Arc::new(ProductionHttpTransport::new()?),
            terminal: Arc::new(ProductionTerminal),
        })
    }
}

#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
    sleeps: Arc<Mutex<Vec<SystemTime>>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sleeps(&self) -> Vec<SystemTime> {
        self.sleeps.lock().expect("sleep lock").clone()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }

    fn sleep_until(&self, deadline: SystemTime) -> Result<(), AnalyzerError> {
        self.sleeps.lock().expect("sleep lock").push(deadline);
        *self.now.lock().expect("clock lock") = deadline;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, AnalyzerError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| AnalyzerError::Io(format!("missing file {}", path.display())))
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    writes: Arc<Mutex<Vec<String>>>,
    answers: Arc<Mutex<VecDeque<String>>>,
    questions: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            ..Self::default()
        }
    }

    pub fn push_answer(&self, answer: impl Into<String>) {
        self.answers
            .lock()
            .expect("answers lock")
            .push_back(answer.into());
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn output(&self) -> String {
        self.written_lines().join("\n")
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().expect("questions lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn stdin_is_tty(&self) -> bool {
        self.is_tty
    }

    fn write_line(&self, line: &str) -> Result<(), AnalyzerError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn prompt(&self, question: &str) -> Result<String, AnalyzerError> {
        self.questions
            .lock()
            .expect("questions lock")
            .push(question.to_string());
        Ok(self
            .answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .unwrap_or_default())
    }
}

#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<VecDeque<Result<ProcessOutput, AnalyzerError>>>>,
    spawned: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, AnalyzerError>) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(output);
    }

    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_response(Ok(ProcessOutput {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }));
    }

    pub fn spawned(&self) -> Vec<ProcessRequest> {
        self.spawned.lock().expect("spawned lock").clone()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, AnalyzerError> {
        self.spawned.lock().expect("spawned lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(AnalyzerError::Process(
                    "no fake response queued".to_string(),
                ))
            })
    }
}

#[derive(Default, Clone)]
pub struct FakeHttpTransport {
    responses: Arc<Mutex<VecDeque<Result<HttpResponse, AnalyzerError>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl FakeHttpTransport {
    pub fn push_response(&self, response: Result<HttpResponse, AnalyzerError>) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(response);
    }

    pub fn push_json(&self, status: u16, body: impl Into<String>) {
        self.push_response(Ok(HttpResponse {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl HttpTransport for FakeHttpTransport {
    fn get(&self, request: HttpRequest) -> Result<HttpResponse, AnalyzerError> {
        self.requests.lock().expect("requests lock").push(request);
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(AnalyzerError::Http("no fake response queued".to_string())))
    }
}
