//! Interactive line-oriented front end.
//!
//! Commands are read from an async line source. Start and stop run on
//! spawned tasks and report back over a channel, so a stop waiting out its
//! grace period never blocks the prompt or the liveness poller.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use runwarden_core::{
    ConfigLoader, EventKind, LoadStatus, ProcessManager, Settings, SupervisorError,
    SupervisorEvent,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::poller::LivenessPoller;
use crate::supervisor::{ProgramStatus, RegisterOutcome, StartOutcome, StopOutcome, Supervisor};

pub const HELP: &str = "\
Commands:
  list | status      show every program and its state
  start <name>       start a program
  stop <name>        stop a program (graceful, then forced)
  stop-all           stop every program
  reload             re-read the configuration file
  help               show this message
  quit | exit        stop every program and leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Start(String),
    Stop(String),
    StopAll,
    Reload,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`. Everything after
    /// the verb is the program name, so names may contain spaces.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let name = |verb: &str| {
            if rest.is_empty() {
                Err(format!("usage: {verb} <name>"))
            } else {
                Ok(rest.to_string())
            }
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "list" | "status" => ConsoleCommand::List,
            "start" => ConsoleCommand::Start(name("start")?),
            "stop" => ConsoleCommand::Stop(name("stop")?),
            "stop-all" => ConsoleCommand::StopAll,
            "reload" => ConsoleCommand::Reload,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command '{other}', type 'help'")),
        };
        Ok(Some(command))
    }
}

fn format_uptime(uptime: chrono::Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Fixed-width table of program states.
pub fn render_status_table(statuses: &[ProgramStatus], now: DateTime<Utc>) -> String {
    if statuses.is_empty() {
        return "No programs registered.".to_string();
    }

    let width = statuses
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut table = format!(
        "{:<width$}  {:<8}  {:>7}  {:>9}  COMMAND",
        "NAME", "STATE", "PID", "UPTIME"
    );
    for status in statuses {
        let state = if status.running { "running" } else { "stopped" };
        let pid = status.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        let uptime = status
            .uptime(now)
            .map(format_uptime)
            .unwrap_or_else(|| "-".into());
        table.push_str(&format!(
            "\n{:<width$}  {:<8}  {:>7}  {:>9}  {}",
            status.name, state, pid, uptime, status.command_line
        ));
    }
    table
}

enum ConsoleMessage {
    Snapshot(Vec<ProgramStatus>),
    Started(String, Result<StartOutcome, SupervisorError>),
    Stopped(String, Result<StopOutcome, SupervisorError>),
    StoppedAll(Vec<(String, Result<StopOutcome, SupervisorError>)>),
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<SupervisorEvent>>,
) -> Option<SupervisorEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub struct Console<M: ProcessManager + 'static, W: Write> {
    supervisor: Arc<Supervisor<M>>,
    loader: ConfigLoader,
    settings: Settings,
    out: W,
    events: Option<mpsc::UnboundedReceiver<SupervisorEvent>>,
    poller: Option<LivenessPoller>,
    in_flight: JoinSet<()>,
    last_seen: HashMap<String, bool>,
}

impl<M: ProcessManager + 'static, W: Write> Console<M, W> {
    pub fn new(
        supervisor: Arc<Supervisor<M>>,
        loader: ConfigLoader,
        settings: Settings,
        out: W,
    ) -> Self {
        Self {
            supervisor,
            loader,
            settings,
            out,
            events: None,
            poller: None,
            in_flight: JoinSet::new(),
            last_seen: HashMap::new(),
        }
    }

    /// Show process exits reported through a `ChannelEventSink`
    pub fn with_events(mut self, events: mpsc::UnboundedReceiver<SupervisorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Read commands until `quit`, end of input or Ctrl-C, then stop the
    /// poller and every program.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.start_poller(&tx);

        let mut events = self.events.take();
        let mut lines = input.lines();
        writeln!(
            self.out,
            "{} program(s) registered. Type 'help' for commands.",
            self.supervisor.names().len()
        )?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("failed to read console input")? else {
                        debug!("Console input closed");
                        break;
                    };
                    match ConsoleCommand::parse(&line) {
                        Ok(Some(ConsoleCommand::Quit)) => break,
                        Ok(Some(command)) => self.dispatch(command, &tx).await?,
                        Ok(None) => {}
                        Err(message) => writeln!(self.out, "{message}")?,
                    }
                }
                Some(message) = rx.recv() => self.render(message)?,
                Some(event) = next_event(&mut events) => self.render_event(&event)?,
                _ = tokio::signal::ctrl_c() => {
                    writeln!(self.out, "Interrupted.")?;
                    break;
                }
            }
        }

        self.shutdown().await
    }

    fn start_poller(&mut self, tx: &mpsc::UnboundedSender<ConsoleMessage>) {
        let tx = tx.clone();
        self.poller = Some(LivenessPoller::spawn(
            self.supervisor.clone(),
            self.settings.monitor_interval(),
            move |snapshot| {
                let _ = tx.send(ConsoleMessage::Snapshot(snapshot));
            },
        ));
    }

    async fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            let shutdown = poller.stop().await;
            debug!(?shutdown, "Liveness poller stopped");
        }
    }

    async fn dispatch(
        &mut self,
        command: ConsoleCommand,
        tx: &mpsc::UnboundedSender<ConsoleMessage>,
    ) -> Result<()> {
        while self.in_flight.try_join_next().is_some() {}

        match command {
            ConsoleCommand::List => {
                self.supervisor.refresh_all().await;
                let table = render_status_table(&self.supervisor.snapshot(), Utc::now());
                writeln!(self.out, "{table}")?;
            }
            ConsoleCommand::Start(name) => {
                writeln!(self.out, "Starting {name}...")?;
                let supervisor = self.supervisor.clone();
                let tx = tx.clone();
                self.in_flight.spawn(async move {
                    let result = supervisor.start(&name).await;
                    let _ = tx.send(ConsoleMessage::Started(name, result));
                });
            }
            ConsoleCommand::Stop(name) => {
                writeln!(self.out, "Stopping {name}...")?;
                let supervisor = self.supervisor.clone();
                let tx = tx.clone();
                self.in_flight.spawn(async move {
                    let result = supervisor.stop(&name).await;
                    let _ = tx.send(ConsoleMessage::Stopped(name, result));
                });
            }
            ConsoleCommand::StopAll => {
                writeln!(self.out, "Stopping all programs...")?;
                let supervisor = self.supervisor.clone();
                let tx = tx.clone();
                self.in_flight.spawn(async move {
                    let results = supervisor.shutdown_all().await;
                    let _ = tx.send(ConsoleMessage::StoppedAll(results));
                });
            }
            ConsoleCommand::Reload => self.reload(tx).await?,
            ConsoleCommand::Help => writeln!(self.out, "{HELP}")?,
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    /// Re-read the configuration and re-register its programs. Running
    /// programs keep running; programs dropped from the file stay registered.
    async fn reload(&mut self, tx: &mpsc::UnboundedSender<ConsoleMessage>) -> Result<()> {
        self.stop_poller().await;

        let load = self.loader.load();
        match load.status {
            LoadStatus::Loaded => {
                let mut added = 0;
                let mut replaced = 0;
                let listed: Vec<String> =
                    load.config.programs.iter().map(|p| p.name.clone()).collect();
                for descriptor in load.config.programs {
                    match self.supervisor.register(descriptor).await {
                        RegisterOutcome::Registered => added += 1,
                        RegisterOutcome::Replaced => replaced += 1,
                    }
                }
                self.settings = load.config.settings;
                writeln!(
                    self.out,
                    "Reloaded {}: {added} new, {replaced} updated.",
                    self.loader.path().display()
                )?;

                let orphaned: Vec<String> = self
                    .supervisor
                    .names()
                    .into_iter()
                    .filter(|name| !listed.contains(name))
                    .collect();
                if !orphaned.is_empty() {
                    writeln!(
                        self.out,
                        "No longer in the file but still registered: {}",
                        orphaned.join(", ")
                    )?;
                }
            }
            LoadStatus::CreatedDefault => writeln!(
                self.out,
                "No configuration found; wrote a template to {}. Edit it and reload.",
                self.loader.path().display()
            )?,
            LoadStatus::Invalid(e) => {
                writeln!(self.out, "Configuration not reloaded: {e}")?
            }
        }

        self.start_poller(tx);
        Ok(())
    }

    fn render(&mut self, message: ConsoleMessage) -> Result<()> {
        match message {
            ConsoleMessage::Snapshot(snapshot) => {
                for status in snapshot {
                    let previous = self.last_seen.insert(status.name.clone(), status.running);
                    match (previous, status.running) {
                        (Some(false), true) => {
                            let pid = status.pid.map(|p| p.to_string()).unwrap_or_default();
                            writeln!(self.out, "{} is running (PID {pid})", status.name)?
                        }
                        (Some(true), false) => writeln!(self.out, "{} stopped", status.name)?,
                        _ => {}
                    }
                }
            }
            ConsoleMessage::Started(name, result) => match result {
                Ok(StartOutcome::Started { pid }) => {
                    self.last_seen.insert(name.clone(), true);
                    writeln!(self.out, "Started {name} (PID {pid})")?
                }
                Ok(StartOutcome::AlreadyRunning { pid }) => {
                    let pid = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
                    writeln!(self.out, "{name} is already running (PID {pid})")?
                }
                Err(e) => writeln!(self.out, "{e}")?,
            },
            ConsoleMessage::Stopped(name, result) => self.render_stop(&name, result)?,
            ConsoleMessage::StoppedAll(results) => {
                for (name, result) in results {
                    self.render_stop(&name, result)?;
                }
            }
        }
        Ok(())
    }

    fn render_stop(&mut self, name: &str, result: Result<StopOutcome, SupervisorError>) -> Result<()> {
        match result {
            Ok(StopOutcome::NotRunning) => writeln!(self.out, "{name} is not running")?,
            Ok(StopOutcome::Graceful { exit }) => {
                self.last_seen.insert(name.to_string(), false);
                writeln!(self.out, "Stopped {name} ({exit})")?
            }
            Ok(StopOutcome::Forced { exit }) => {
                self.last_seen.insert(name.to_string(), false);
                writeln!(self.out, "Force-stopped {name} ({exit})")?
            }
            Err(e) => writeln!(self.out, "{e}")?,
        }
        Ok(())
    }

    fn render_event(&mut self, event: &SupervisorEvent) -> Result<()> {
        if let EventKind::ProcessExited { .. } | EventKind::LivenessCheckFailed = event.kind {
            self.last_seen.insert(event.program.clone(), false);
            writeln!(self.out, "{}: {}", event.program, event.message)?;
        }
        Ok(())
    }

    async fn shutdown(mut self) -> Result<()> {
        self.stop_poller().await;
        // Let requested starts land before everything is stopped
        while self.in_flight.join_next().await.is_some() {}

        writeln!(self.out, "Stopping all programs...")?;
        for (name, result) in self.supervisor.shutdown_all().await {
            if !matches!(result, Ok(StopOutcome::NotRunning)) {
                self.render_stop(&name, result)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProcessManager, RecordingSink, fixture_descriptor};
    use runwarden_core::{ChannelEventSink, FanoutEventSink, ProcessId};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("  "), Ok(None));
        assert_eq!(ConsoleCommand::parse("list"), Ok(Some(ConsoleCommand::List)));
        assert_eq!(ConsoleCommand::parse("STATUS"), Ok(Some(ConsoleCommand::List)));
        assert_eq!(
            ConsoleCommand::parse("start  my program "),
            Ok(Some(ConsoleCommand::Start("my program".to_string())))
        );
        assert_eq!(
            ConsoleCommand::parse("stop web"),
            Ok(Some(ConsoleCommand::Stop("web".to_string())))
        );
        assert_eq!(ConsoleCommand::parse("stop-all"), Ok(Some(ConsoleCommand::StopAll)));
        assert_eq!(ConsoleCommand::parse("exit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(
            ConsoleCommand::parse("start"),
            Err("usage: start <name>".to_string())
        );
        assert!(ConsoleCommand::parse("launch web").is_err());
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(chrono::Duration::seconds(7)), "7s");
        assert_eq!(format_uptime(chrono::Duration::seconds(125)), "2m05s");
        assert_eq!(format_uptime(chrono::Duration::seconds(3723)), "1h02m03s");
        assert_eq!(format_uptime(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_status_table() {
        let now = Utc::now();
        let statuses = vec![
            ProgramStatus {
                name: "web".to_string(),
                running: true,
                pid: Some(ProcessId(42)),
                started_at: Some(now - chrono::Duration::seconds(65)),
                command_line: "server --port 80".to_string(),
                working_directory: PathBuf::from("/srv"),
            },
            ProgramStatus {
                name: "worker".to_string(),
                running: false,
                pid: None,
                started_at: None,
                command_line: "worker".to_string(),
                working_directory: PathBuf::from("/srv"),
            },
        ];

        let table = render_status_table(&statuses, now);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines[1].contains("running") && lines[1].contains("42"));
        assert!(lines[1].contains("1m05s") && lines[1].ends_with("server --port 80"));
        assert!(lines[2].contains("stopped") && lines[2].contains('-'));

        assert_eq!(render_status_table(&[], now), "No programs registered.");
    }

    async fn console_with(
        dir: &TempDir,
        names: &[&str],
    ) -> (
        Arc<Supervisor<FakeProcessManager>>,
        Console<FakeProcessManager, Vec<u8>>,
    ) {
        let (channel, events) = ChannelEventSink::new();
        let sink = FanoutEventSink::new()
            .with(Arc::new(RecordingSink::default()))
            .with(Arc::new(channel));
        let supervisor = Arc::new(Supervisor::new(FakeProcessManager::default(), Arc::new(sink)));
        for name in names {
            supervisor.register(fixture_descriptor(dir.path(), name)).await;
        }
        let console = Console::new(
            supervisor.clone(),
            ConfigLoader::new(dir.path().join("config.json")),
            Settings::default(),
            Vec::new(),
        )
        .with_events(events);
        (supervisor, console)
    }

    #[tokio::test]
    async fn test_quit_stops_everything() {
        let dir = TempDir::new().unwrap();
        let (supervisor, console) = console_with(&dir, &["a", "b"]).await;
        supervisor.start("a").await.unwrap();

        console.run(&b"help\nquit\n"[..]).await.unwrap();

        assert!(supervisor.running_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_end_of_input_stops_everything() {
        let dir = TempDir::new().unwrap();
        let (supervisor, console) = console_with(&dir, &["a"]).await;

        console.run(&b"start a\n"[..]).await.unwrap();

        assert!(!supervisor.is_running("a").await);
    }

    #[tokio::test]
    async fn test_reload_registers_new_programs() {
        let dir = TempDir::new().unwrap();
        let (supervisor, console) = console_with(&dir, &["a"]).await;
        let config = config_json(&dir, &["a", "b"]);
        std::fs::write(dir.path().join("config.json"), config).unwrap();

        console.run(&b"reload\nquit\n"[..]).await.unwrap();

        assert_eq!(supervisor.names(), vec!["a", "b"]);
    }

    fn config_json(dir: &TempDir, names: &[&str]) -> String {
        let programs: Vec<String> = names
            .iter()
            .map(|name| {
                format!(
                    r#"{{"name":"{name}","workingDirectory":{:?},"executable":"tool"}}"#,
                    dir.path().display().to_string()
                )
            })
            .collect();
        format!(
            r#"{{"settings":{{"monitorIntervalSeconds":1}},"programs":[{}]}}"#,
            programs.join(",")
        )
    }
}
