// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Priority for render threads when BEATSYNC_THREAD_PRIORITY is unset.
const DEFAULT_RENDER_THREAD_PRIORITY: u8 = 70;

const PRIORITY_ENV: &str = "BEATSYNC_THREAD_PRIORITY";
const DISABLE_RT_ENV: &str = "BEATSYNC_DISABLE_RT_AUDIO";

/// Reads BEATSYNC_THREAD_PRIORITY (0-99). Read once per device start, never
/// from inside the render cycle.
pub fn render_thread_priority() -> Option<ThreadPriorityValue> {
    let priority = std::env::var(PRIORITY_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<u8>().ok())
        .filter(|value| *value < 100)
        .unwrap_or(DEFAULT_RENDER_THREAD_PRIORITY);
    ThreadPriorityValue::try_from(priority).ok()
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

/// Whether to ask for SCHED_FIFO on the render thread. Opt out with
/// BEATSYNC_DISABLE_RT_AUDIO=1.
pub fn rt_audio_enabled() -> bool {
    !env_flag(DISABLE_RT_ENV)
}

/// Raises the calling thread's priority the first time it is called.
/// `priority_set` is owned by the render closure.
pub fn configure_render_thread(
    priority: Option<ThreadPriorityValue>,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    *priority_set = true;

    let Some(priority) = priority else {
        return;
    };
    let tp = ThreadPriority::Crossplatform(priority);
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = ?e, "Failed to raise render thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled SCHED_FIFO for render thread"),
            Err(e) => warn!(error = %e, "Failed to set SCHED_FIFO for render thread"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;
}

#[cfg(test)]
mod test {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_priority_from_env() {
        std::env::remove_var(PRIORITY_ENV);
        assert_eq!(
            render_thread_priority(),
            ThreadPriorityValue::try_from(DEFAULT_RENDER_THREAD_PRIORITY).ok()
        );

        std::env::set_var(PRIORITY_ENV, "42");
        assert_eq!(
            render_thread_priority(),
            ThreadPriorityValue::try_from(42u8).ok()
        );

        // Out of range falls back to the default.
        std::env::set_var(PRIORITY_ENV, "150");
        assert_eq!(
            render_thread_priority(),
            ThreadPriorityValue::try_from(DEFAULT_RENDER_THREAD_PRIORITY).ok()
        );
        std::env::remove_var(PRIORITY_ENV);
    }

    #[test]
    #[serial]
    fn test_rt_opt_out() {
        std::env::remove_var(DISABLE_RT_ENV);
        assert!(rt_audio_enabled());
        std::env::set_var(DISABLE_RT_ENV, "Yes");
        assert!(!rt_audio_enabled());
        std::env::set_var(DISABLE_RT_ENV, "0");
        assert!(rt_audio_enabled());
        std::env::remove_var(DISABLE_RT_ENV);
    }
}
