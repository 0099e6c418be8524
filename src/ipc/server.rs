use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{EventKind, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender},
    thread,
    time::Duration,
};

use super::pipeline::{PipelineCmd, run_pipeline};
use super::runtime::socket_path;
use crate::actions::UinputSink;
use crate::config::{DaemonConfigState, Profile};
use crate::gestures::SwipeDirection;

pub fn run_daemon(frames: Option<PathBuf>) -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut state = DaemonState::new()?;
    info!("daemon: active profile '{}'", state.cfg.active_name);

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();

    spawn_signal_thread(tx_req.clone())?;
    let _watcher = watch_profiles(&state.cfg.profiles_dir, tx_req.clone())
        .map_err(|e| warn!("profile hot-reload disabled: {e}"))
        .ok();

    // gesture thread
    let pipeline = PipelineThread::start(frames, state.cfg.profile.clone(), tx_evt.clone())?;

    // accept loop
    listener.set_nonblocking(true)?;
    let result = loop {
        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            let st_snapshot = state.clone_shallow();
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, st_snapshot, tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        sync_pipeline(&mut state, &pipeline, &rx_evt);

        let mut shutdown = false;
        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload => {
                    if let Err(e) = state.cfg.reload() {
                        error!("reload failed, keeping last good profile: {e}");
                    } else {
                        pipeline.update_profile(state.cfg.profile.clone());
                        info!("profile reloaded");
                    }
                }
                IpcMsg::UseProfile(name) => {
                    if let Err(e) = state.cfg.set_active(&name) {
                        error!("use profile failed: {e}");
                    } else {
                        pipeline.update_profile(state.cfg.profile.clone());
                        info!("switched active profile to {}", state.cfg.active_name);
                    }
                }
                IpcMsg::Toggle => pipeline.send(PipelineCmd::Toggle),
                IpcMsg::SetEnabled(en) => pipeline.send(PipelineCmd::SetEnabled(en)),
                IpcMsg::Shutdown => shutdown = true,
            }
        }
        if shutdown {
            break Ok(());
        }

        thread::sleep(Duration::from_millis(5));
    };

    let _ = std::fs::remove_file(&sock);
    info!("daemon: stopped");
    result
}

/// Folds pipeline events into `state`, and marks the pipeline stopped if its
/// thread ended without saying so (a panic).
fn sync_pipeline(state: &mut DaemonState, pipeline: &PipelineThread, rx_evt: &Receiver<DaemonEvent>) {
    // checked before draining so every event the thread sent is already queued
    let finished = pipeline.is_finished();
    while let Ok(evt) = rx_evt.try_recv() {
        state.apply(evt);
    }
    if finished && state.pipeline_running {
        error!("gesture pipeline thread died");
        state.apply(DaemonEvent::PipelineStopped);
    }
}

fn spawn_signal_thread(tx_req: Sender<IpcMsg>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: caught signal {sig}, shutting down");
            let _ = tx_req.send(IpcMsg::Shutdown);
        }
    });
    Ok(())
}

fn watch_profiles(dir: &Path, tx_req: Sender<IpcMsg>) -> Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(ev) = res else { return };
        let touches_profile = ev
            .paths
            .iter()
            .any(|p| p.extension().is_some_and(|e| e == "toml"));
        if touches_profile && matches!(ev.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            let _ = tx_req.send(IpcMsg::Reload);
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("daemon: watching {} for profile changes", dir.display());
    Ok(watcher)
}

fn open_frames(frames: Option<&Path>) -> Result<Box<dyn BufRead + Send>> {
    match frames {
        None => Ok(Box::new(BufReader::new(io::stdin()))),
        Some(p) if p == Path::new("-") => Ok(Box::new(BufReader::new(io::stdin()))),
        Some(p) => {
            // a FIFO blocks here until the producer opens it
            let f = File::open(p).map_err(|e| anyhow!("failed to open {}: {e}", p.display()))?;
            Ok(Box::new(BufReader::new(f)))
        }
    }
}

fn handle_client(mut stream: UnixStream, st: DaemonState, tx_req: Sender<IpcMsg>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match op {
        "status" => serde_json::json!({"ok": true, "data": {
            "enabled": st.enabled,
            "active_profile": st.cfg.active_name,
            "socket": socket_path().ok(),
            "pipeline_running": st.pipeline_running,
            "frames": st.frames,
            "fps": st.fps,
            "gestures": st.gestures,
            "last_gesture": st.last_gesture.map(|(direction, t_ms)| serde_json::json!({
                "direction": direction,
                "t_ms": t_ms,
            })),
        }}),
        "toggle" => {
            // applied asynchronously by the pipeline; `status` shows the result
            let _ = tx_req.send(IpcMsg::Toggle);
            serde_json::json!({"ok": true, "data": {"requested": "toggle"}})
        }
        "enable" | "disable" => {
            let en = op == "enable";
            let _ = tx_req.send(IpcMsg::SetEnabled(en));
            serde_json::json!({"ok": true, "data": {"enabled": en}})
        }
        "reload" => {
            let _ = tx_req.send(IpcMsg::Reload);
            serde_json::json!({"ok": true, "data": {"active_profile": st.cfg.active_name}})
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            match st.cfg.load_named(name) {
                Ok(_) => {
                    let _ = tx_req.send(IpcMsg::UseProfile(name.to_string()));
                    serde_json::json!({"ok": true, "data": {"active_profile": name}})
                }
                Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
            }
        }
        "list" => {
            let list = st.cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": st.cfg.active_name}})
        }
        "doctor" => {
            let report = st.cfg.doctor_report();
            serde_json::json!({"ok": true, "data": report})
        }
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    writeln!(stream, "{}", resp)?;
    Ok(())
}

struct DaemonState {
    enabled: bool,
    cfg: DaemonConfigState,
    pipeline_running: bool,
    frames: u64,
    fps: f64,
    gestures: u64,
    last_gesture: Option<(SwipeDirection, u64)>,
}

impl DaemonState {
    fn new() -> Result<Self> {
        Ok(Self::with_cfg(DaemonConfigState::load_or_install_default()?))
    }

    fn with_cfg(cfg: DaemonConfigState) -> Self {
        Self {
            enabled: true,
            cfg,
            pipeline_running: true,
            frames: 0,
            fps: 0.0,
            gestures: 0,
            last_gesture: None,
        }
    }

    fn clone_shallow(&self) -> Self {
        Self {
            enabled: self.enabled,
            cfg: self.cfg.clone(),
            pipeline_running: self.pipeline_running,
            frames: self.frames,
            fps: self.fps,
            gestures: self.gestures,
            last_gesture: self.last_gesture,
        }
    }

    fn apply(&mut self, evt: DaemonEvent) {
        match evt {
            DaemonEvent::Gesture { direction, t_ms } => {
                self.gestures += 1;
                self.last_gesture = Some((direction, t_ms));
            }
            DaemonEvent::Enabled(en) => self.enabled = en,
            DaemonEvent::Stats { frames, fps } => {
                self.frames = frames;
                if fps > 0.0 {
                    self.fps = fps;
                }
            }
            DaemonEvent::PipelineStopped => {
                self.pipeline_running = false;
                warn!("pipeline stopped; control socket stays up until `swipectl stop`");
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum IpcMsg {
    Reload,
    UseProfile(String),
    Toggle,
    SetEnabled(bool),
    Shutdown,
}

pub enum DaemonEvent {
    Gesture { direction: SwipeDirection, t_ms: u64 },
    Enabled(bool),
    Stats { frames: u64, fps: f64 },
    PipelineStopped,
}

struct PipelineThread {
    tx_cmd: Sender<PipelineCmd>,
    thread: thread::JoinHandle<()>,
}

impl PipelineThread {
    fn start(frames: Option<PathBuf>, profile: Profile, tx_evt: Sender<DaemonEvent>) -> Result<Self> {
        let (tx_cmd, rx_cmd): (Sender<PipelineCmd>, Receiver<PipelineCmd>) = mpsc::channel();
        let sink = UinputSink::new().unwrap_or_else(|e| {
            warn!("uinput unavailable ({e}); running in NO-OP mode");
            UinputSink::noop()
        });
        let handle = thread::spawn(move || {
            let source = match open_frames(frames.as_deref()) {
                Ok(s) => s,
                Err(e) => {
                    error!("frame source: {e}");
                    let _ = tx_evt.send(DaemonEvent::PipelineStopped);
                    return;
                }
            };
            if let Err(e) = run_pipeline(source, profile, sink, rx_cmd, tx_evt.clone()) {
                error!("gesture pipeline failed: {e}");
                let _ = tx_evt.send(DaemonEvent::PipelineStopped);
            }
        });
        Ok(Self {
            tx_cmd,
            thread: handle,
        })
    }

    fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    fn send(&self, cmd: PipelineCmd) {
        if self.tx_cmd.send(cmd).is_err() {
            warn!("pipeline is not running; command dropped");
        }
    }

    fn update_profile(&self, new_profile: Profile) {
        self.send(PipelineCmd::UpdateProfile(new_profile));
    }
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "swipectl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> DaemonState {
        DaemonState::with_cfg(DaemonConfigState::load_from(dir.path()).unwrap())
    }

    /// Runs one request through `handle_client` over a socket pair.
    fn ask(st: &DaemonState, req: &str) -> (serde_json::Value, Receiver<IpcMsg>) {
        let (mut client, server) = UnixStream::pair().unwrap();
        let (tx, rx) = mpsc::channel();
        writeln!(client, "{req}").unwrap();
        handle_client(server, st.clone_shallow(), tx).unwrap();
        let mut resp = String::new();
        BufReader::new(client).read_line(&mut resp).unwrap();
        (serde_json::from_str(&resp).unwrap(), rx)
    }

    #[test]
    fn status_reports_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let mut st = state(&dir);
        st.apply(DaemonEvent::Gesture {
            direction: SwipeDirection::Left,
            t_ms: 1234,
        });
        st.apply(DaemonEvent::Stats { frames: 90, fps: 29.5 });

        let (resp, rx) = ask(&st, r#"{"op":"status"}"#);
        assert_eq!(resp["ok"], true);
        let data = &resp["data"];
        assert_eq!(data["enabled"], true);
        assert_eq!(data["active_profile"], "default");
        assert_eq!(data["pipeline_running"], true);
        assert_eq!(data["frames"], 90);
        assert_eq!(data["gestures"], 1);
        assert_eq!(data["last_gesture"]["direction"], "left");
        assert_eq!(data["last_gesture"]["t_ms"], 1234);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn toggle_is_forwarded_without_guessing_the_outcome() {
        let dir = TempDir::new().unwrap();
        let st = state(&dir);
        let (resp, rx) = ask(&st, r#"{"op":"toggle"}"#);
        assert_eq!(resp["ok"], true);
        assert!(resp["data"].get("enabled").is_none());
        assert_eq!(rx.try_recv(), Ok(IpcMsg::Toggle));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn enable_and_disable_are_explicit() {
        let dir = TempDir::new().unwrap();
        let st = state(&dir);
        let (resp, rx) = ask(&st, r#"{"op":"disable"}"#);
        assert_eq!(resp["data"]["enabled"], false);
        assert_eq!(rx.try_recv(), Ok(IpcMsg::SetEnabled(false)));

        let (resp, rx) = ask(&st, r#"{"op":"enable"}"#);
        assert_eq!(resp["data"]["enabled"], true);
        assert_eq!(rx.try_recv(), Ok(IpcMsg::SetEnabled(true)));
    }

    #[test]
    fn use_checks_the_profile_first() {
        let dir = TempDir::new().unwrap();
        let st = state(&dir);
        let (resp, rx) = ask(&st, r#"{"op":"use","profile":"missing"}"#);
        assert_eq!(resp["ok"], false);
        assert!(resp["error"].as_str().unwrap().contains("missing.toml"));
        assert!(rx.try_recv().is_err());

        std::fs::write(st.cfg.profiles_dir.join("calm.toml"), "[meta]\nname = \"calm\"\n").unwrap();
        let (resp, rx) = ask(&st, r#"{"op":"use","profile":"calm"}"#);
        assert_eq!(resp["ok"], true);
        assert_eq!(rx.try_recv(), Ok(IpcMsg::UseProfile("calm".to_string())));
    }

    #[test]
    fn reload_list_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let st = state(&dir);
        let (resp, rx) = ask(&st, r#"{"op":"reload"}"#);
        assert_eq!(resp["ok"], true);
        assert_eq!(rx.try_recv(), Ok(IpcMsg::Reload));

        let (resp, _) = ask(&st, r#"{"op":"list"}"#);
        assert_eq!(resp["data"]["profiles"], serde_json::json!(["default"]));
        assert_eq!(resp["data"]["active"], "default");

        let (resp, rx) = ask(&st, r#"{"op":"shutdown"}"#);
        assert_eq!(resp["ok"], true);
        assert_eq!(rx.try_recv(), Ok(IpcMsg::Shutdown));
    }

    #[test]
    fn unknown_op_is_an_error_envelope() {
        let dir = TempDir::new().unwrap();
        let st = state(&dir);
        let (resp, rx) = ask(&st, r#"{"op":"dance"}"#);
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"], "unknown op: dance");
        assert!(rx.try_recv().is_err());
    }

    fn wait_until_finished(p: &PipelineThread) {
        for _ in 0..200 {
            if p.is_finished() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("pipeline thread did not finish");
    }

    #[test]
    fn panicked_pipeline_shows_as_stopped() {
        let dir = TempDir::new().unwrap();
        let mut st = state(&dir);
        let (tx_cmd, _rx_cmd) = mpsc::channel();
        let (_tx_evt, rx_evt) = mpsc::channel();
        let pipeline = PipelineThread {
            tx_cmd,
            thread: thread::spawn(|| panic!("recognizer blew up")),
        };
        wait_until_finished(&pipeline);

        sync_pipeline(&mut st, &pipeline, &rx_evt);
        assert!(!st.pipeline_running);
    }

    #[test]
    fn live_pipeline_keeps_running_and_events_apply() {
        let dir = TempDir::new().unwrap();
        let mut st = state(&dir);
        let (tx_cmd, rx_cmd) = mpsc::channel::<PipelineCmd>();
        let (tx_evt, rx_evt) = mpsc::channel();
        let pipeline = PipelineThread {
            tx_cmd,
            // lives until the command channel closes
            thread: thread::spawn(move || while rx_cmd.recv().is_ok() {}),
        };

        tx_evt.send(DaemonEvent::Enabled(false)).unwrap();
        sync_pipeline(&mut st, &pipeline, &rx_evt);
        assert!(st.pipeline_running);
        assert!(!st.enabled);

        let PipelineThread { tx_cmd, thread: handle } = pipeline;
        drop(tx_cmd);
        handle.join().unwrap();
    }
}
