use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    process::Command,
};

use crate::config::{DaemonConfigState, Profile};
use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // options first; pico-args wants them consumed before free args
    let frames: Option<PathBuf> = pargs.opt_value_from_str("--frames")?;
    let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon(frames);
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let mut cmd = Command::new(exe);
            cmd.arg("--daemon");
            if let Some(f) = &frames {
                cmd.arg("--frames").arg(f);
            }
            let child = cmd.spawn()?;
            println!("swipectl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("daemon") => ipc::run_daemon(frames),

        Some("stop") => request("shutdown"),
        Some("status") => request("status"),
        Some("toggle") => request("toggle"),
        Some("enable") => request("enable"),
        Some("disable") => request("disable"),
        Some("reload") => request("reload"),
        Some("list") => request("list"),
        Some("doctor") => request("doctor"),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: swipectl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("replay") => {
            let path: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: swipectl replay <frames.jsonl> [--profile <name>]"))?;
            replay(&path, profile_name.as_deref())
        }

        Some("emit") => {
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: swipectl emit key <CHORD>"))?;
            let mut sink = crate::actions::UinputSink::new()?;
            match what.as_str() {
                "key" => {
                    let chord: String = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: swipectl emit key ALT+TAB"))?;
                    sink.key_chord(&chord)?;
                    println!("ok: sent key chord {chord}");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn request(op: &str) -> Result<()> {
    let r = ipc::client_request(serde_json::json!({ "op": op }))?;
    print_response(&r);
    Ok(())
}

fn replay(path: &Path, profile_name: Option<&str>) -> Result<()> {
    let profile = match profile_name {
        Some(name) => DaemonConfigState::load_or_install_default()?.load_named(name)?,
        None => DaemonConfigState::load_or_install_default()
            .map(|c| c.profile)
            .or_else(|e| {
                log::warn!("no usable active profile ({e}); using built-in defaults");
                Profile::bundled_default()
            })?,
    };
    let f = File::open(path).map_err(|e| anyhow!("failed to open {}: {e}", path.display()))?;
    let fired = ipc::replay(BufReader::new(f), &profile)?;
    for out in &fired {
        if let Some(g) = out.gesture {
            println!(
                "{}",
                serde_json::json!({
                    "t_ms": out.t_ms,
                    "direction": g.direction(),
                    "action": profile.action_for(&g),
                })
            );
        }
    }
    eprintln!("{} gesture(s)", fired.len());
    Ok(())
}

fn print_help() {
    println!(
        r#"swipectl — hand-swipe window switcher

USAGE:
  swipectl help [command]                 Show general or command-specific help
  swipectl start [--frames <path>]        Start the daemon in the background
  swipectl daemon [--frames <path>]       Run the daemon in the foreground
  swipectl stop                           Stop the daemon
  swipectl status                         Show daemon state
  swipectl toggle                         Flip gesture recognition on/off
  swipectl enable | disable               Turn gesture recognition on/off
  swipectl reload                         Reload active profile
  swipectl use <name>                     Switch active profile
  swipectl list                           List profiles
  swipectl doctor                         Diagnose permissions
  swipectl replay <file> [--profile <n>]  Run recorded frames, print gestures
  swipectl emit key ALT+TAB               Emit a key chord

FRAMES:
  One JSON object per line, from stdin or --frames (file or FIFO):
  {{"t_ms": 1034, "width": 640, "height": 480, "hands": [[{{"x":0.5,"y":0.4}}, ...21 points]]}}
  An optional "key": "g" toggles recognition, "q" stops the pipeline.

TIPS:
  - Profiles: ~/.config/swipectl/profiles (reloaded on change)
  - Active profile pointer: ~/.config/swipectl/active
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!(
            "usage: swipectl start [--frames <path>]\nStarts the background daemon. Frames are read from <path> or stdin."
        ),
        "daemon" => println!(
            "usage: swipectl daemon [--frames <path>]\nRuns the daemon in the foreground, e.g. `extractor | swipectl daemon`."
        ),
        "stop" => println!("usage: swipectl stop\nStops the running daemon."),
        "status" => println!(
            "usage: swipectl status\nShows enabled flag, active profile, frame and gesture counters."
        ),
        "toggle" => println!("usage: swipectl toggle\nFlips gesture recognition; cooldown is kept."),
        "enable" | "disable" => println!("usage: swipectl {cmd}\nTurns gesture recognition {}.", if cmd == "enable" { "on" } else { "off" }),
        "reload" => println!(
            "usage: swipectl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: swipectl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: swipectl list\nLists available profiles."),
        "doctor" => println!(
            "usage: swipectl doctor\nChecks uinput permissions and shows active thresholds."
        ),
        "replay" => println!(
            "usage: swipectl replay <file> [--profile <name>]\nRuns the recognizer over recorded frames and prints each gesture as JSON. No keys are sent."
        ),
        "emit" => println!("usage:\n  swipectl emit key ALT+TAB"),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
