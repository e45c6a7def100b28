// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// LPR/LPD job submission (RFC 1179 subset) for label printers.
//
// One attempt per queue candidate: initialise the queue, transfer the control
// file, transfer the data file. Every step is answered by a single ack byte
// (0x00). Candidates are tried in priority order until one printer queue
// confirms the job.
//
// Ack handling is deliberately uneven. Printers in the field skip or garble
// some acks yet print fine, so only the size announcements and the final
// confirmation are binding:
//
//   step                         non-ack
//   queue init                   logged, continue
//   control file announcement    fatal for this attempt
//   control file body            logged, continue
//   data file announcement       fatal for this attempt
//   data file body (final)       PrintNotConfirmed

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use corlink_core::config::PrinterSettings;
use corlink_core::error::{CorlinkError, Result};
use corlink_core::types::{ControlFileFields, ErrorClass, PrintJob};

use crate::progress::{ProgressSink, percent};

/// Default LPR port.
pub const LPR_PORT: u16 = 515;

/// Acknowledgement byte.
const ACK: u8 = 0x00;

/// "Receive a printer job" / "receive control file" command byte.
const CMD_RECEIVE_CONTROL: u8 = 0x02;

/// "Receive data file" command byte.
const CMD_RECEIVE_DATA: u8 = 0x03;

/// Settings for one LPR submitter.
#[derive(Debug, Clone)]
pub struct LprConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for connect and for every read/write of an attempt.
    pub timeout: Duration,
    /// Data file chunk size (progress granularity).
    pub chunk_size: usize,
    pub hostname: String,
    pub job_owner: String,
    pub job_name: String,
}

impl LprConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: LPR_PORT,
            timeout: Duration::from_secs(10),
            chunk_size: 4096,
            hostname: "corlink".into(),
            job_owner: "corlink".into(),
            job_name: "label".into(),
        }
    }

    pub fn from_settings(settings: &PrinterSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.lpr_port,
            timeout: Duration::from_secs(settings.lpr_timeout_secs),
            chunk_size: settings.chunk_size.max(1),
            hostname: settings.resolved_hostname(),
            job_owner: settings.job_owner.clone(),
            job_name: settings.job_name.clone(),
        }
    }
}

/// Pushes raster jobs to a printer's LPD.
#[derive(Debug, Clone)]
pub struct LprJobSubmitter {
    config: LprConfig,
}

impl LprJobSubmitter {
    pub fn new(config: LprConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LprConfig {
        &self.config
    }

    /// Try each queue candidate in order; stop at the first confirmed job.
    ///
    /// Per-queue failures are logged, not returned. Returns the queue that
    /// accepted the job, or `LprQueuesExhausted` once every candidate failed.
    pub async fn submit(&self, job: &PrintJob, progress: &dyn ProgressSink) -> Result<String> {
        let mut attempts = 0;
        let mut last_error: Option<CorlinkError> = None;

        for queue in &job.queue_candidates {
            attempts += 1;
            info!(queue = %queue, attempt = attempts, "trying LPR queue");

            match self.submit_to_queue(queue, &job.payload, progress).await {
                Ok(()) => {
                    info!(queue = %queue, "LPR job confirmed");
                    return Ok(queue.clone());
                }
                Err(e) => {
                    warn!(queue = %queue, error = %e, "LPR attempt failed");
                    let permanent = e.class() == ErrorClass::Permanent;
                    last_error = Some(e);
                    if permanent {
                        break;
                    }
                }
            }
        }

        Err(CorlinkError::LprQueuesExhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no queue candidates configured".into()),
        })
    }

    /// Run one full attempt against `queue`.
    ///
    /// The socket lives in this scope and is closed on every return path.
    pub async fn submit_to_queue(
        &self,
        queue: &str,
        payload: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let timeout = self.config.timeout;
        debug!(addr = %addr, queue, "connecting via LPR");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                CorlinkError::ConnectionUnavailable(format!(
                    "LPR connection to {} timed out after {}s",
                    addr,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| CorlinkError::ConnectionUnavailable(format!("LPR connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;

        let mut session = LprSession { stream, timeout };
        progress.report("lpr: connected", 0);

        // 1. Queue init
        session
            .send(&command_line(CMD_RECEIVE_CONTROL, queue), "queue init")
            .await?;
        let response = session.read_ack("queue init").await?;
        if response != Some(ACK) {
            // Some daemons ack the init implicitly; keep going.
            warn!(queue, ?response, "queue init not acknowledged");
        }

        // 2. Control file
        let fields = ControlFileFields::for_queue(
            queue,
            &self.config.hostname,
            &self.config.job_owner,
            &self.config.job_name,
        );
        let control = fields.render();
        debug!(queue, job = %fields.unique_job_id, "sending control file");

        let announce = format!("{} cfA{}", control.len(), queue);
        session
            .send(&command_line(CMD_RECEIVE_CONTROL, &announce), "control file announcement")
            .await?;
        session.expect_ack("control file announcement").await?;

        let mut body = control.into_bytes();
        body.push(0);
        session.send(&body, "control file").await?;
        let response = session.read_ack("control file").await?;
        if response != Some(ACK) {
            warn!(queue, ?response, "control file not acknowledged");
        }

        // 3. Data file
        let announce = format!("{} dfA{}", payload.len(), queue);
        session
            .send(&command_line(CMD_RECEIVE_DATA, &announce), "data file announcement")
            .await?;
        session.expect_ack("data file announcement").await?;

        let mut sent = 0;
        for chunk in payload.chunks(self.config.chunk_size.max(1)) {
            session.send(chunk, "data file").await?;
            sent += chunk.len();
            debug!(sent, total = payload.len(), "LPR data progress");
            progress.report("lpr: sending data", percent(sent, payload.len()));
        }
        session.send(&[0], "data file terminator").await?;

        match session.read_ack("data file").await? {
            Some(ACK) => {
                progress.report("lpr: confirmed", 100);
                Ok(())
            }
            other => Err(CorlinkError::PrintNotConfirmed(other.into_iter().collect())),
        }
    }
}

/// `<cmd><body>\n`, the framing of every LPD command line.
fn command_line(cmd: u8, body: &str) -> Vec<u8> {
    let mut line = Vec::with_capacity(body.len() + 2);
    line.push(cmd);
    line.extend_from_slice(body.as_bytes());
    line.push(b'\n');
    line
}

/// One open LPD connection with a per-operation deadline.
struct LprSession {
    stream: TcpStream,
    timeout: Duration,
}

impl LprSession {
    async fn send(&mut self, bytes: &[u8], step: &str) -> Result<()> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.stream.write_all(bytes))
            .await
            .map_err(|_| CorlinkError::timeout(format!("LPR {step}"), timeout))??;
        Ok(())
    }

    /// Read the single response byte. `None` means the peer closed.
    async fn read_ack(&mut self, step: &str) -> Result<Option<u8>> {
        let timeout = self.timeout;
        let mut byte = [0u8; 1];
        let n = tokio::time::timeout(timeout, self.stream.read(&mut byte))
            .await
            .map_err(|_| CorlinkError::timeout(format!("LPR {step} ack"), timeout))??;
        let response = (n == 1).then_some(byte[0]);
        debug!(step, ?response, "LPR response");
        Ok(response)
    }

    async fn expect_ack(&mut self, step: &str) -> Result<()> {
        match self.read_ack(step).await? {
            Some(ACK) => Ok(()),
            other => Err(CorlinkError::ProtocolNacked {
                step: step.to_string(),
                response: other.into_iter().collect(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::progress::{ChannelProgress, NoProgress};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// How the simulated printer answers.
    #[derive(Clone)]
    pub(crate) struct PeerScript {
        /// Byte answered to the queue init line.
        pub init_ack: u8,
        /// Byte answered to the control file announcement.
        pub control_announce_ack: u8,
        /// Byte answered after the control file body.
        pub control_body_ack: u8,
        /// Byte answered after the data file body.
        pub final_ack: u8,
        /// Byte answered to the data file announcement.
        pub data_announce_ack: u8,
        /// Queue whose init is never answered.
        pub stall_queue: Option<String>,
    }

    impl Default for PeerScript {
        fn default() -> Self {
            Self {
                init_ack: ACK,
                control_announce_ack: ACK,
                control_body_ack: ACK,
                final_ack: ACK,
                data_announce_ack: ACK,
                stall_queue: None,
            }
        }
    }

    /// What the simulated printer saw.
    #[derive(Default)]
    pub(crate) struct PeerLog {
        pub connections: usize,
        /// Command lines (without trailing newline), in arrival order.
        pub lines: Vec<Vec<u8>>,
        pub control_files: Vec<String>,
        pub data_files: Vec<Vec<u8>>,
    }

    /// Spawn an in-process LPD. Returns its port and the shared log.
    pub(crate) async fn spawn_lpd(script: PeerScript) -> (u16, Arc<Mutex<PeerLog>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let log = Arc::new(Mutex::new(PeerLog::default()));
        let shared = log.clone();

        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else {
                    return;
                };
                shared.lock().unwrap().connections += 1;
                tokio::spawn(serve(sock, script.clone(), shared.clone()));
            }
        });

        (port, log)
    }

    async fn serve(sock: TcpStream, script: PeerScript, log: Arc<Mutex<PeerLog>>) {
        let mut reader = BufReader::new(sock);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            line.pop();
            log.lock().unwrap().lines.push(line.clone());

            let command = line[0];
            let args = String::from_utf8_lossy(&line[1..]).to_string();
            match args.split_once(' ') {
                // Queue init: "\x02queue"
                None => {
                    if script.stall_queue.as_deref() == Some(args.as_str()) {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        return;
                    }
                    reader.get_mut().write_all(&[script.init_ack]).await.unwrap();
                }
                // Sub-command: "\x02N cfA.." or "\x03N dfA.."
                Some((len, _name)) => {
                    let len: usize = len.parse().unwrap();
                    let announce_ack = if command == CMD_RECEIVE_DATA {
                        script.data_announce_ack
                    } else {
                        script.control_announce_ack
                    };
                    reader.get_mut().write_all(&[announce_ack]).await.unwrap();
                    if announce_ack != ACK {
                        return;
                    }

                    let mut body = vec![0u8; len + 1];
                    if reader.read_exact(&mut body).await.is_err() {
                        return;
                    }
                    assert_eq!(body.pop(), Some(0), "file not NUL terminated");

                    if command == CMD_RECEIVE_DATA {
                        log.lock().unwrap().data_files.push(body);
                        reader.get_mut().write_all(&[script.final_ack]).await.unwrap();
                    } else {
                        log.lock()
                            .unwrap()
                            .control_files
                            .push(String::from_utf8(body).unwrap());
                        reader.get_mut().write_all(&[script.control_body_ack]).await.unwrap();
                    }
                }
            }
        }
    }

    pub(crate) fn test_config(port: u16) -> LprConfig {
        LprConfig {
            port,
            timeout: Duration::from_millis(300),
            chunk_size: 16,
            hostname: "bench".into(),
            ..LprConfig::new("127.0.0.1")
        }
    }

    fn job(queues: &[&str], payload: &[u8]) -> PrintJob {
        PrintJob {
            queue_candidates: queues.iter().map(|q| q.to_string()).collect(),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn acked_job_succeeds_with_three_announcements() {
        let (port, log) = spawn_lpd(PeerScript::default()).await;
        let submitter = LprJobSubmitter::new(test_config(port));
        let payload: Vec<u8> = (0..100u8).collect();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let queue = submitter
            .submit(&job(&["raw", "lp"], &payload), &ChannelProgress::new(tx))
            .await
            .unwrap();
        assert_eq!(queue, "raw");

        // Let the peer task finish recording.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let log = log.lock().unwrap();
        assert_eq!(log.connections, 1);
        assert_eq!(log.lines.len(), 3);
        assert_eq!(log.lines[0], b"\x02raw");
        let control_len = log.control_files[0].len();
        assert_eq!(log.lines[1], format!("\x02{control_len} cfAraw").into_bytes());
        assert_eq!(log.lines[2], b"\x03100 dfAraw");
        assert_eq!(log.data_files[0], payload);

        let control = &log.control_files[0];
        assert!(control.starts_with("Hbench\nPcorlink\nJlabel\nldfAraw\nNprintjob_"));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first().unwrap().step, "lpr: connected");
        assert_eq!(events.last().unwrap().step, "lpr: confirmed");
        assert!(events.iter().any(|e| e.step == "lpr: sending data" && e.percent == 16));
    }

    #[tokio::test]
    async fn wrong_final_ack_is_not_confirmed() {
        let (port, _log) = spawn_lpd(PeerScript {
            final_ack: 0x01,
            ..Default::default()
        })
        .await;
        let submitter = LprJobSubmitter::new(test_config(port));
        let err = submitter
            .submit_to_queue("raw", b"raster", &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CorlinkError::PrintNotConfirmed(ref r) if r == &[0x01]));
    }

    #[tokio::test]
    async fn success_stops_the_candidate_loop() {
        let (port, log) = spawn_lpd(PeerScript::default()).await;
        let submitter = LprJobSubmitter::new(test_config(port));
        submitter
            .submit(&job(&["raw", "lp", "LPT1"], b"x"), &NoProgress)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.lock().unwrap().connections, 1);
    }

    #[tokio::test]
    async fn stalled_queue_falls_through_to_next_candidate() {
        let (port, log) = spawn_lpd(PeerScript {
            stall_queue: Some("raw".into()),
            ..Default::default()
        })
        .await;
        let submitter = LprJobSubmitter::new(test_config(port));
        let queue = submitter
            .submit(&job(&["raw", "lp"], b"label"), &NoProgress)
            .await
            .unwrap();
        assert_eq!(queue, "lp");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let log = log.lock().unwrap();
        assert_eq!(log.connections, 2);
        assert_eq!(log.lines[0], b"\x02raw");
        assert_eq!(log.lines[1], b"\x02lp");
        // Control file is rebuilt for the queue that took the job.
        assert!(log.control_files[0].contains("ldfAlp\n"));
        assert_eq!(log.lines[3], b"\x035 dfAlp");
    }

    #[tokio::test]
    async fn nacked_data_announcement_is_fatal_for_attempt() {
        let (port, _log) = spawn_lpd(PeerScript {
            data_announce_ack: 0x01,
            ..Default::default()
        })
        .await;
        let submitter = LprJobSubmitter::new(test_config(port));
        let err = submitter
            .submit_to_queue("lp", b"raster", &NoProgress)
            .await
            .unwrap_err();
        assert!(
            matches!(err, CorlinkError::ProtocolNacked { ref step, .. } if step == "data file announcement")
        );
    }

    #[tokio::test]
    async fn nacked_control_announcement_is_fatal_for_attempt() {
        let (port, log) = spawn_lpd(PeerScript {
            control_announce_ack: 0x01,
            ..Default::default()
        })
        .await;
        let submitter = LprJobSubmitter::new(test_config(port));
        let err = submitter
            .submit_to_queue("raw", b"raster", &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CorlinkError::ProtocolNacked { ref step, ref response }
                if step == "control file announcement" && response == &[0x01]
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.lock().unwrap().data_files.is_empty());
    }

    #[tokio::test]
    async fn nacked_queue_init_is_tolerated() {
        let (port, log) = spawn_lpd(PeerScript {
            init_ack: 0x01,
            ..Default::default()
        })
        .await;
        let submitter = LprJobSubmitter::new(test_config(port));
        submitter
            .submit_to_queue("raw", b"raster", &NoProgress)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.lock().unwrap().data_files[0], b"raster");
    }

    #[tokio::test]
    async fn nacked_control_body_is_tolerated() {
        let (port, log) = spawn_lpd(PeerScript {
            control_body_ack: 0x01,
            ..Default::default()
        })
        .await;
        let submitter = LprJobSubmitter::new(test_config(port));
        submitter
            .submit_to_queue("raw", b"raster", &NoProgress)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let log = log.lock().unwrap();
        assert_eq!(log.control_files.len(), 1);
        assert_eq!(log.data_files[0], b"raster");
    }

    #[tokio::test]
    async fn every_candidate_failing_is_exhaustion() {
        let (port, log) = spawn_lpd(PeerScript {
            final_ack: 0x02,
            ..Default::default()
        })
        .await;
        let submitter = LprJobSubmitter::new(test_config(port));
        let err = submitter
            .submit(&job(&["raw", "lp", "label"], b"x"), &NoProgress)
            .await
            .unwrap_err();
        match err {
            CorlinkError::LprQueuesExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("not confirmed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(log.lock().unwrap().connections, 3);
    }

    #[tokio::test]
    async fn refused_connection_moves_on() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let submitter = LprJobSubmitter::new(test_config(port));
        let err = submitter
            .submit(&job(&["raw", "lp"], b"x"), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CorlinkError::LprQueuesExhausted { attempts: 2, .. }));
    }

    #[test]
    fn command_lines_are_newline_terminated() {
        assert_eq!(command_line(CMD_RECEIVE_DATA, "12 dfAlp"), b"\x0312 dfAlp\n");
    }

    #[tokio::test]
    async fn empty_candidate_list() {
        let submitter = LprJobSubmitter::new(test_config(9));
        let err = submitter.submit(&job(&[], b"x"), &NoProgress).await.unwrap_err();
        assert!(matches!(err, CorlinkError::LprQueuesExhausted { attempts: 0, .. }));
    }
}
