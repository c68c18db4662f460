//! Scenario tests for the assembled controller.
//!
//! These drive `AvatarController` the way a render loop would: host commands
//! interleaved with fixed-step `update` calls, no wall-clock time involved.

use std::time::Duration;

use super::blend_target::{BlendTarget, ModelCapabilities};
use super::controller::AvatarController;
use super::events::AvatarEvent;
use super::presets::{Emotion, VisemeCode};
use super::scheduler::{AnimationClip, ClipLibrary};
use super::talking::TalkingState;
use super::viseme::FrequencySample;
use crate::config::AvatarConfig;
use crate::error::AvatarError;

const DT: f32 = 1.0 / 60.0;

/// Helper: every clip the default config references, plus one extra.
fn library() -> ClipLibrary {
    ClipLibrary::from_clips([
        AnimationClip::new("idle_breathing", 4.0),
        AnimationClip::new("idle_look_around", 2.0),
        AnimationClip::new("idle_shift_weight", 1.5),
        AnimationClip::new("idle_stretch", 3.0),
        AnimationClip::new("talking_base", 2.0),
        AnimationClip::new("talking_gesture_open", 1.2),
        AnimationClip::new("talking_gesture_point", 1.0),
        AnimationClip::new("talking_nod", 0.8),
        AnimationClip::new("wave", 2.5),
    ])
}

fn controller() -> AvatarController {
    AvatarController::with_seed(
        AvatarConfig::default(),
        library(),
        &ModelCapabilities::full(),
        1234,
    )
    .unwrap()
}

/// Helper: loud speech frame with most energy in the low band.
fn loud_vowel() -> FrequencySample {
    let mut bins = vec![230u8; 40];
    bins.extend(vec![50u8; 40]);
    bins.extend(vec![20u8; 40]);
    FrequencySample::from_bytes(&bins)
}

fn run(c: &mut AvatarController, seconds: f32) {
    let frames = (seconds / DT).round() as usize;
    for _ in 0..frames {
        c.update(DT);
    }
}

fn clip_events(events: &[AvatarEvent]) -> Vec<(Option<String>, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            AvatarEvent::ClipStarted { group, clip, .. } => Some((group.clone(), clip.clone())),
            _ => None,
        })
        .collect()
}

// ── Lifecycle ──────────────────────────────────────────────

#[test]
fn startup_plays_idle_and_signals_ready() {
    let mut c = controller();
    let events = c.drain_events();
    assert_eq!(events.last(), Some(&AvatarEvent::Ready));
    assert_eq!(
        clip_events(&events),
        vec![(Some("idle".to_string()), "idle_breathing".to_string())]
    );
    assert_eq!(c.talking_state(), TalkingState::Idle);
    assert_eq!(c.current_clip(), Some("idle_breathing"));
}

#[test]
fn missing_base_clip_fails_startup() {
    let library = ClipLibrary::from_clips([
        AnimationClip::new("idle_breathing", 4.0),
        AnimationClip::new("talking_gesture_open", 1.2),
    ]);
    let result = AvatarController::with_seed(
        AvatarConfig::default(),
        library,
        &ModelCapabilities::full(),
        1,
    );
    assert!(matches!(
        result,
        Err(AvatarError::MissingBaseClip { ref group, ref clip })
            if group == "talking" && clip == "talking_base"
    ));
}

#[test]
fn missing_variation_clips_only_shrink_the_group() {
    let library = ClipLibrary::from_clips([
        AnimationClip::new("idle_breathing", 4.0),
        AnimationClip::new("talking_base", 2.0),
    ]);
    let mut c = AvatarController::with_seed(
        AvatarConfig::default(),
        library,
        &ModelCapabilities::full(),
        1,
    )
    .unwrap();
    assert!(c.scheduler().pending_timer("idle").is_none());
    run(&mut c, 30.0);
    assert_eq!(c.current_clip(), Some("idle_breathing"), "Base loops forever");
}

#[test]
fn model_without_blink_targets_is_rejected() {
    let caps = ModelCapabilities::from_names(
        BlendTarget::ALL
            .iter()
            .filter(|t| **t != BlendTarget::EyeBlinkRight)
            .map(|t| t.as_str()),
    );
    let result = AvatarController::with_seed(AvatarConfig::default(), library(), &caps, 1);
    assert!(matches!(
        result,
        Err(AvatarError::UnsupportedBlendTarget(ref n)) if n == "eyeBlinkRight"
    ));
}

#[test]
fn oversized_detection_budget_is_a_config_error() {
    let mut config = AvatarConfig::default();
    config.viseme.budget_ms = 1e300;
    let result = AvatarController::with_seed(config, library(), &ModelCapabilities::full(), 1);
    assert!(matches!(result, Err(AvatarError::InvalidConfig(_))));
}

#[test]
fn teardown_cancels_all_timers() {
    let mut c = controller();
    c.start_talking().unwrap();
    c.teardown();
    assert!(c.is_torn_down());
    assert!(c.scheduler().pending_timer("idle").is_none());
    assert!(c.scheduler().pending_timer("talking").is_none());
    c.drain_events();

    run(&mut c, 20.0);
    assert!(clip_events(&c.drain_events()).is_empty(), "Nothing fires after teardown");
    assert_eq!(c.frame().weights.get(BlendTarget::EyeBlinkLeft), 0.0);
}

#[test]
fn emotion_keeps_relaxing_after_teardown() {
    let mut c = controller();
    c.set_emotion("playful").unwrap();
    c.update(DT);
    c.teardown();

    run(&mut c, 4.0);
    let smile = c.frame().weights.get(BlendTarget::MouthSmile);
    assert!((smile - 0.8).abs() < 1e-3, "Expected settled playful smile, got {}", smile);
    assert_eq!(c.emotion(), Emotion::Playful);
}

// ── Emotion ────────────────────────────────────────────────

#[test]
fn unknown_emotion_is_rejected_without_state_change() {
    let mut c = controller();
    c.set_emotion("sad").unwrap();
    run(&mut c, 0.5);
    let before = c.emotion_weights().clone();
    c.drain_events();

    let err = c.set_emotion("hangry").unwrap_err();
    assert!(matches!(err, AvatarError::UnknownEmotion(_)));
    assert_eq!(c.emotion(), Emotion::Sad);
    assert_eq!(c.emotion_weights(), &before);
    assert!(c.drain_events().is_empty());
}

#[test]
fn neutral_to_playful_smile_rises_smoothly() {
    let mut c = controller();
    c.set_emotion("neutral").unwrap();
    run(&mut c, 0.2);
    c.set_emotion("playful").unwrap();

    let mut last = c.frame().weights.get(BlendTarget::MouthSmile);
    for _ in 0..240 {
        let smile = c.update(DT).weights.get(BlendTarget::MouthSmile);
        assert!(smile >= last, "Smile dropped: {} -> {}", last, smile);
        assert!(smile - last <= 0.08 + 1e-5, "Discontinuous jump: {} -> {}", last, smile);
        last = smile;
    }
    assert!((last - 0.8).abs() < 1e-3, "Should reach the playful smile, got {}", last);
}

// ── Talking / lip-sync ─────────────────────────────────────

#[test]
fn immediate_stop_leaves_no_orphaned_talking_timer() {
    let mut c = controller();
    c.start_talking().unwrap();
    let armed = c.scheduler().pending_timer("talking").expect("chain timer armed");
    c.stop_talking().unwrap();
    c.drain_events();

    run(&mut c, armed + 10.0);
    let talking_clips: Vec<_> = clip_events(&c.drain_events())
        .into_iter()
        .filter(|(group, _)| group.as_deref() == Some("talking"))
        .collect();
    assert!(talking_clips.is_empty(), "Orphaned timer fired: {:?}", talking_clips);
    assert!(c.scheduler().pending_timer("talking").is_none());
}

#[test]
fn talking_drives_mouth_from_audio() {
    let mut c = controller();
    c.start_talking().unwrap();
    c.push_frequency_sample(loud_vowel());
    let frame = c.update(DT);
    assert_eq!(frame.viseme, VisemeCode::Aa);
    assert_eq!(frame.talking, TalkingState::Talking);
    assert!(frame.weights.get(BlendTarget::JawOpen) > 0.5);
}

#[test]
fn mouth_rests_when_audio_stops_arriving() {
    let mut c = controller();
    c.start_talking().unwrap();
    c.push_frequency_sample(loud_vowel());
    assert_eq!(c.update(DT).viseme, VisemeCode::Aa);

    run(&mut c, 2.0);
    let frame = c.frame();
    assert_eq!(frame.viseme, VisemeCode::Sil, "Stale spectrum re-used");
    assert_eq!(
        frame.weights.get(BlendTarget::JawOpen),
        c.emotion_weights().get(BlendTarget::JawOpen),
        "Jaw should carry only the emotion layer"
    );

    c.push_frequency_sample(loud_vowel());
    assert_eq!(c.update(DT).viseme, VisemeCode::Aa, "Fresh audio resumes lip-sync");
}

#[test]
fn samples_are_ignored_while_idle() {
    let mut c = controller();
    c.push_frequency_sample(loud_vowel());
    let frame = c.update(DT);
    assert_eq!(frame.viseme, VisemeCode::Sil);
    assert_eq!(frame.weights.get(BlendTarget::JawOpen), 0.0);
}

#[test]
fn stop_talking_removes_viseme_contribution_immediately() {
    let mut c = controller();
    c.set_emotion("surprised").unwrap();
    run(&mut c, 3.0);
    c.start_talking().unwrap();
    c.push_frequency_sample(loud_vowel());
    c.update(DT);
    let emotion_jaw = c.emotion_weights().get(BlendTarget::JawOpen);
    assert!(c.frame().weights.get(BlendTarget::JawOpen) > emotion_jaw);

    c.stop_talking().unwrap();
    let frame = c.frame();
    assert_eq!(frame.viseme, VisemeCode::Sil);
    for target in BlendTarget::ALL {
        if BlendTarget::BLINK.contains(&target) {
            continue;
        }
        assert!(
            (frame.weights.get(target) - c.emotion_weights().get(target)).abs() < 1e-6,
            "{} kept residual mouth shape",
            target
        );
    }
}

#[test]
fn guard_trip_disables_lip_sync_for_the_session() {
    let mut c = controller();
    c.set_emotion("happy").unwrap();
    c.start_talking().unwrap();
    c.push_frequency_sample(loud_vowel());
    c.detector_mut().finish(VisemeCode::Aa, Duration::from_millis(50));
    c.drain_events();

    let frame = c.update(DT);
    assert_eq!(frame.viseme, VisemeCode::Sil);
    assert!(!c.lip_sync_available());
    let events = c.drain_events();
    let tripped = events.iter().any(|e| {
        matches!(e, AvatarEvent::LipSyncDisabled { elapsed_ms, .. } if *elapsed_ms >= 50.0)
    });
    assert!(
        tripped,
        "Expected a loud trip event, got {:?}",
        events
    );

    // Emotion keeps driving the face, and lip-sync stays off across sessions.
    run(&mut c, 1.0);
    assert!(c.frame().weights.get(BlendTarget::MouthSmile) > 0.3);
    c.stop_talking().unwrap();
    c.start_talking().unwrap();
    c.push_frequency_sample(loud_vowel());
    assert_eq!(c.update(DT).viseme, VisemeCode::Sil);
}

#[test]
fn transitions_are_idempotent() {
    let mut c = controller();
    c.drain_events();
    c.stop_talking().unwrap();
    assert!(c.drain_events().is_empty());

    c.start_talking().unwrap();
    c.drain_events();
    c.start_talking().unwrap();
    assert!(c.drain_events().is_empty());
    assert_eq!(c.talking_state(), TalkingState::Talking);
}

#[test]
fn talking_chains_variations_and_returns_to_idle_base() {
    let mut c = controller();
    c.start_talking().unwrap();
    c.drain_events();
    run(&mut c, 8.0);
    let clips = clip_events(&c.drain_events());
    assert!(clips.len() >= 4, "Expected chained gestures, got {:?}", clips);
    assert!(clips.iter().all(|(g, _)| g.as_deref() == Some("talking")));

    c.stop_talking().unwrap();
    assert_eq!(c.current_clip(), Some("idle_breathing"));
}

// ── Direct override ────────────────────────────────────────

#[test]
fn play_animation_accepts_clips_and_groups() {
    let mut c = controller();
    c.drain_events();
    c.play_animation("wave").unwrap();
    assert_eq!(c.current_clip(), Some("wave"));
    let clips = clip_events(&c.drain_events());
    assert_eq!(clips, vec![(None, "wave".to_string())]);

    c.play_animation("idle").unwrap();
    assert_eq!(c.current_clip(), Some("idle_breathing"));

    assert!(matches!(
        c.play_animation("moonwalk"),
        Err(AvatarError::UnknownClip(_))
    ));
}

#[test]
fn forced_group_replaces_the_armed_group() {
    let mut c = controller();
    c.play_animation("talking").unwrap();
    assert!(!c.scheduler().is_active("idle"));
    assert!(c.scheduler().pending_timer("idle").is_none());
    c.drain_events();

    run(&mut c, 20.0);
    let clips = clip_events(&c.drain_events());
    assert!(!clips.is_empty(), "Talking chain should keep playing");
    assert!(
        clips.iter().all(|(g, _)| g.as_deref() == Some("talking")),
        "Idle clips leaked into the forced group: {:?}",
        clips
    );
    assert_eq!(c.talking_state(), TalkingState::Idle);

    // The regular lifecycle takes over again without leftovers.
    c.start_talking().unwrap();
    c.stop_talking().unwrap();
    assert!(c.scheduler().is_active("idle"));
    assert!(!c.scheduler().is_active("talking"));
}

#[test]
fn crossfade_is_reported_with_fixed_duration() {
    let mut c = controller();
    c.drain_events();
    c.play_animation("wave").unwrap();
    match c.drain_events().as_slice() {
        [AvatarEvent::ClipStarted { fade_secs, .. }] => assert_eq!(*fade_secs, 0.5),
        other => panic!("unexpected events {:?}", other),
    }
    c.update(0.25);
    let weights = c.clip_weights();
    assert_eq!(weights.len(), 2, "Mid-fade mixes two clips: {:?}", weights);
}

// ── Blink ──────────────────────────────────────────────────

#[test]
fn blink_targets_only_close_briefly() {
    let mut c = controller();
    let mut closed_frames = 0usize;
    let mut longest = 0usize;
    for _ in 0..(60 * 20) {
        let w = c.update(DT).weights.get(BlendTarget::EyeBlinkLeft);
        assert!((0.0..=1.0).contains(&w));
        if w > 0.0 {
            closed_frames += 1;
            longest = longest.max(closed_frames);
        } else {
            closed_frames = 0;
        }
    }
    assert!(longest > 0, "No blink within 20s");
    assert!(
        longest as f32 * DT <= 0.18 + DT,
        "Blink window too long: {} frames",
        longest
    );
}
