use anyhow::{Result, anyhow};
use log::info;
#[cfg(not(target_os = "linux"))]
use log::warn;
use std::process::{Command, Stdio};

/// Chord tokens the virtual keyboard understands.
pub const KEY_TOKENS: &[&str] = &[
    "CTRL", "CONTROL", "ALT", "SHIFT", "SUPER", "META", "WIN", "TAB", "GRAVE", "`", "LEFT",
    "RIGHT", "UP", "DOWN", "PAGEUP", "PAGEDOWN", "ESC",
];

pub struct UinputSink {
    #[cfg(target_os = "linux")]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create()?;
            Ok(Self {
                linux: Some(Box::new(dev)),
            })
        }
        #[cfg(not(target_os = "linux"))]
        {
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    pub fn noop() -> Self {
        Self {
            #[cfg(target_os = "linux")]
            linux: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        #[cfg(target_os = "linux")]
        {
            self.linux.is_none()
        }
        #[cfg(not(target_os = "linux"))]
        {
            true
        }
    }

    /// Send a chord like "ALT+TAB" or "ALT+SHIFT+TAB".
    pub fn key_chord(&mut self, chord: &str) -> Result<()> {
        let parts = parse_chord(chord)?;
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            let mut keys = Vec::with_capacity(parts.len());
            for p in &parts {
                keys.push(map_key(p)?);
            }
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = parts;
        Ok(())
    }
}

/// Split and upper-case a chord, rejecting unknown tokens.
pub fn parse_chord(chord: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = chord
        .split('+')
        .map(|s| s.trim().to_ascii_uppercase())
        .collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(anyhow!("malformed key chord: '{chord}'"));
    }
    for p in &parts {
        if !KEY_TOKENS.contains(&p.as_str()) {
            return Err(anyhow!("unsupported key token: {p}"));
        }
    }
    Ok(parts)
}

/// Fire-and-forget `sh -c`; the child is not awaited.
pub fn run_command(cmdline: &str) -> Result<()> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(cmdline)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|e| anyhow!("failed to spawn '{cmdline}': {e}"))?;
    info!("spawned '{}' (pid={})", cmdline, child.id());
    Ok(())
}

#[cfg(target_os = "linux")]
fn map_key(tok: &str) -> Result<uinput::event::keyboard::Key> {
    use uinput::event::keyboard::Key as K;
    let k = match tok {
        "CTRL" | "CONTROL" => K::LeftControl,
        "ALT" => K::LeftAlt,
        "SHIFT" => K::LeftShift,
        "SUPER" | "META" | "WIN" => K::LeftMeta,
        "TAB" => K::Tab,
        "GRAVE" | "`" => K::Grave,
        "LEFT" => K::Left,
        "RIGHT" => K::Right,
        "UP" => K::Up,
        "DOWN" => K::Down,
        "PAGEUP" => K::PageUp,
        "PAGEDOWN" => K::PageDown,
        "ESC" => K::Esc,
        other => return Err(anyhow!("unsupported key token: {other}")),
    };
    Ok(k)
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create() -> Result<Self> {
        let mut builder = uinput::default()?.name("Swipectl Virtual Keyboard")?;
        for tok in KEY_TOKENS {
            builder = builder.event(map_key(tok)?)?;
        }
        let dev = builder.create()?;

        info!("uinput: created virtual keyboard");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: uinput::event::keyboard::Key, val: i32) -> Result<()> {
        self.dev.send(key, val)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chords_are_normalized() {
        assert_eq!(parse_chord("alt+shift+tab").unwrap(), vec!["ALT", "SHIFT", "TAB"]);
        assert_eq!(parse_chord(" ALT + TAB ").unwrap(), vec!["ALT", "TAB"]);
    }

    #[test]
    fn bad_chords_are_rejected() {
        assert!(parse_chord("ALT+").is_err());
        assert!(parse_chord("ALT+F13").is_err());
        assert!(parse_chord("").is_err());
    }

    #[test]
    fn noop_sink_accepts_valid_chords() {
        let mut sink = UinputSink::noop();
        assert!(sink.is_noop());
        sink.key_chord("ALT+TAB").unwrap();
        assert!(sink.key_chord("HYPER+TAB").is_err());
    }
}
