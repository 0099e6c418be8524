use anyhow::{Result, anyhow};

use crate::actions::{self, UinputSink};
use crate::config::Profile;
use crate::gestures::Gesture;

pub fn dispatch_gesture(g: &Gesture, profile: &Profile, sink: &mut UinputSink) -> Result<()> {
    let key = g.binding_key();
    let action = profile.action_for(g);

    if action.is_empty() || action == "none" {
        return Ok(());
    }
    if let Some(rest) = action.strip_prefix("key:") {
        sink.key_chord(rest.trim())?;
        return Ok(());
    }
    if let Some(rest) = action.strip_prefix("cmd:") {
        if !profile.meta.allow_commands {
            return Err(anyhow!("{key}: cmd: actions are disabled in this profile"));
        }
        actions::run_command(rest.trim())?;
        return Ok(());
    }

    Err(anyhow!("unknown action mapping for {} -> '{}'", key, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bindings_dispatch_to_noop_sink() {
        let p = Profile::bundled_default().unwrap();
        let mut sink = UinputSink::noop();
        dispatch_gesture(&Gesture::SwipeRight, &p, &mut sink).unwrap();
        dispatch_gesture(&Gesture::SwipeLeft, &p, &mut sink).unwrap();
    }

    #[test]
    fn unbound_and_none_are_silent() {
        let p = Profile::from_toml_str("[meta]\n[bindings]\n\"swipe.left\" = \"none\"\n").unwrap();
        let mut sink = UinputSink::noop();
        dispatch_gesture(&Gesture::SwipeLeft, &p, &mut sink).unwrap();
        dispatch_gesture(&Gesture::SwipeRight, &p, &mut sink).unwrap();
    }

    #[test]
    fn bad_chord_surfaces_as_error() {
        let mut p = Profile::bundled_default().unwrap();
        p.bindings
            .insert("swipe.right".into(), "key:ALT+NOPE".into());
        let mut sink = UinputSink::noop();
        assert!(dispatch_gesture(&Gesture::SwipeRight, &p, &mut sink).is_err());
    }

    #[test]
    fn cmd_requires_opt_in_at_dispatch_time() {
        let mut p = Profile::bundled_default().unwrap();
        p.bindings.insert("swipe.left".into(), "cmd:true".into());
        let mut sink = UinputSink::noop();
        assert!(dispatch_gesture(&Gesture::SwipeLeft, &p, &mut sink).is_err());
    }
}
