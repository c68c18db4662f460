//! Talking State Controller — switches the body between idle and talking motion.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::scheduler::{AnimationScheduler, SchedulePolicy};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkingState {
    Idle,
    Talking,
}

#[derive(Debug)]
pub struct TalkingController {
    state: TalkingState,
    idle_group: String,
    talking_group: String,
}

impl TalkingController {
    pub fn new(idle_group: impl Into<String>, talking_group: impl Into<String>) -> Self {
        Self {
            state: TalkingState::Idle,
            idle_group: idle_group.into(),
            talking_group: talking_group.into(),
        }
    }

    pub fn state(&self) -> TalkingState {
        self.state
    }

    pub fn idle_group(&self) -> &str {
        &self.idle_group
    }

    pub fn talking_group(&self) -> &str {
        &self.talking_group
    }

    /// Start the idle group. Called once when the avatar comes up.
    pub fn begin(&mut self, scheduler: &mut AnimationScheduler) -> Result<()> {
        self.state = TalkingState::Idle;
        scheduler.start_group(&self.idle_group, SchedulePolicy::Interval)
    }

    /// Idle → Talking. Returns `false` if already talking.
    pub fn start_talking(&mut self, scheduler: &mut AnimationScheduler) -> Result<bool> {
        if self.state == TalkingState::Talking {
            return Ok(false);
        }
        scheduler.stop_other_groups(&self.talking_group);
        scheduler.start_group(&self.talking_group, SchedulePolicy::Chain)?;
        self.state = TalkingState::Talking;
        info!("[Talking] Idle -> Talking");
        Ok(true)
    }

    /// Talking → Idle. The chained-variation timer (and any forced group) is
    /// cancelled before the idle group starts, so nothing from the talking
    /// chain can fire later.
    pub fn stop_talking(&mut self, scheduler: &mut AnimationScheduler) -> Result<bool> {
        if self.state == TalkingState::Idle {
            return Ok(false);
        }
        scheduler.stop_other_groups(&self.idle_group);
        scheduler.start_group(&self.idle_group, SchedulePolicy::Interval)?;
        self.state = TalkingState::Idle;
        info!("[Talking] Talking -> Idle");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::scheduler::{AnimationClip, ClipLibrary, GroupSpec};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scheduler() -> AnimationScheduler {
        let library = ClipLibrary::from_clips([
            AnimationClip::new("idle_loop", 3.0),
            AnimationClip::new("idle_a", 1.0),
            AnimationClip::new("talk_loop", 2.0),
            AnimationClip::new("talk_a", 1.0),
            AnimationClip::new("talk_b", 1.0),
        ]);
        let mut s = AnimationScheduler::new(library, 0.4, StdRng::seed_from_u64(3));
        s.register(&GroupSpec {
            name: "idle".into(),
            base: "idle_loop".into(),
            variations: vec!["idle_a".into()],
            interval: [5.0, 8.0],
        })
        .unwrap();
        s.register(&GroupSpec {
            name: "talking".into(),
            base: "talk_loop".into(),
            variations: vec!["talk_a".into(), "talk_b".into()],
            interval: [0.0, 0.0],
        })
        .unwrap();
        s
    }

    #[test]
    fn transitions_switch_groups() {
        let mut s = scheduler();
        let mut c = TalkingController::new("idle", "talking");
        c.begin(&mut s).unwrap();
        assert_eq!(s.current_clip(), Some("idle_loop"));

        assert!(c.start_talking(&mut s).unwrap());
        assert_eq!(c.state(), TalkingState::Talking);
        assert_eq!(s.current_clip(), Some("talk_loop"));
        assert!(!s.is_active("idle"));

        assert!(c.stop_talking(&mut s).unwrap());
        assert_eq!(c.state(), TalkingState::Idle);
        assert_eq!(s.current_clip(), Some("idle_loop"));
        assert!(s.pending_timer("talking").is_none());
    }

    #[test]
    fn transitions_stop_any_forced_group() {
        let mut s = scheduler();
        let mut c = TalkingController::new("idle", "talking");
        c.begin(&mut s).unwrap();
        s.start_group("talking", SchedulePolicy::Chain).unwrap();
        s.stop_group("idle");

        c.start_talking(&mut s).unwrap();
        c.stop_talking(&mut s).unwrap();
        assert!(s.is_active("idle"));
        assert!(!s.is_active("talking"), "Talking chain should be disarmed");
    }

    #[test]
    fn repeated_transitions_are_noops() {
        let mut s = scheduler();
        let mut c = TalkingController::new("idle", "talking");
        c.begin(&mut s).unwrap();
        assert!(!c.stop_talking(&mut s).unwrap(), "Already idle");
        c.start_talking(&mut s).unwrap();
        s.take_changes();
        assert!(!c.start_talking(&mut s).unwrap(), "Already talking");
        assert!(s.take_changes().is_empty());
    }
}
