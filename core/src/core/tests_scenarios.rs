//! End-to-end engine scenarios (§8): each test drives the real
//! `CommandEngine` pipeline — transaction, event log, undo tree,
//! snapshot/replay — rather than calling an executor directly, so these
//! exercise the wiring between the command library and the engine that
//! the per-command unit tests (colocated with each executor) don't
//! reach on their own.

use crate::core::commands::{
    CommandEngine, CommandEngineConfig, CommandEnvelope, ExecutorRegistry, StackKey,
};
use crate::core::model::{Project, Sequence, Track, TrackType};
use crate::core::store::TimelineStore;
use crate::core::types::{ProjectId, SequenceId, TrackId};

fn setup() -> (CommandEngine, ProjectId, SequenceId, TrackId) {
    let mut store = TimelineStore::in_memory().unwrap();
    let project = Project::new("Scenario Project");
    TimelineStore::insert_project(store.connection(), &project).unwrap();

    let seq = Sequence::new(project.id.clone(), "seq", 24, 1);
    let track = Track::new(seq.id.clone(), TrackType::Video, 1);
    {
        let conn = store.connection();
        TimelineStore::insert_sequence(conn, &seq).unwrap();
        TimelineStore::insert_track(conn, &track).unwrap();
    }

    let mut registry = ExecutorRegistry::new();
    crate::core::commands::register_standard_library(&mut registry);
    let engine = CommandEngine::new(store, registry, CommandEngineConfig::default());
    (engine, project.id, seq.id, track.id)
}

fn env(
    project_id: &ProjectId,
    sequence_id: &SequenceId,
    command_type: &str,
    mut params: serde_json::Value,
) -> CommandEnvelope {
    params["sequence_id"] = serde_json::json!(sequence_id);
    CommandEnvelope::new(command_type, project_id.clone(), params)
}

/// §8 scenario 1: split restores. Split a clip, expect two halves;
/// undo restores the single clip; redo recreates the second half with
/// the *same* id the first execution generated.
#[test]
fn scenario_split_restores_on_undo_and_reuses_id_on_redo() {
    let (mut engine, project_id, sequence_id, track_id) = setup();

    let create = env(
        &project_id,
        &sequence_id,
        "create_clip",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 0,
            "duration_frames": 240,
            "source_in_frame": 0,
            "source_out_frame": 240,
        }),
    );
    let created = engine.execute(create).unwrap();
    assert!(created.success);
    let clip_id = created.result_data.unwrap()["clip_id"].as_str().unwrap().to_string();

    let key = StackKey::Sequence(sequence_id.clone());
    let split = env(
        &project_id,
        &sequence_id,
        "split_clip",
        serde_json::json!({ "clip_id": clip_id, "split_time_frame": 100 }),
    );
    let split_result = engine.execute(split).unwrap();
    assert!(split_result.success);
    let second_id = split_result.result_data.unwrap()["second_clip_id"]
        .as_str()
        .unwrap()
        .to_string();

    let first = TimelineStore::get_clip(engine.store().connection(), &clip_id).unwrap();
    assert_eq!(first.duration_frames, 100);
    assert_eq!(first.source_out_frame, 100);
    let second = TimelineStore::get_clip(engine.store().connection(), &second_id).unwrap();
    assert_eq!(second.timeline_start_frame, 100);
    assert_eq!(second.duration_frames, 140);
    assert_eq!(second.source_in_frame, 100);
    assert_eq!(second.source_out_frame, 240);

    engine.undo(&key).unwrap();
    let restored = TimelineStore::get_clip(engine.store().connection(), &clip_id).unwrap();
    assert_eq!(restored.duration_frames, 240);
    assert_eq!(restored.source_out_frame, 240);
    assert!(TimelineStore::get_clip(engine.store().connection(), &second_id).is_err());

    engine.redo(&key).unwrap();
    let recreated = TimelineStore::get_clip(engine.store().connection(), &second_id).unwrap();
    assert_eq!(recreated.id, second_id);
    assert_eq!(recreated.duration_frames, 140);
}

/// §8 scenario 2: insert ripples downstream clips on the target track,
/// and undo restores their original positions and removes the insert.
#[test]
fn scenario_insert_ripples_and_undo_restores_positions() {
    let (mut engine, project_id, sequence_id, track_id) = setup();

    for (id_hint, start, dur) in [("a", 0, 100), ("b", 150, 100), ("c", 300, 50)] {
        let create = env(
            &project_id,
            &sequence_id,
            "create_clip",
            serde_json::json!({
                "track_id": track_id,
                "timeline_start_frame": start,
                "duration_frames": dur,
                "source_in_frame": 0,
                "source_out_frame": dur,
                "name": id_hint,
            }),
        );
        assert!(engine.execute(create).unwrap().success);
    }

    let insert = env(
        &project_id,
        &sequence_id,
        "insert",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 150,
            "duration_frames": 50,
            "source_in_frame": 0,
            "source_out_frame": 50,
        }),
    );
    let result = engine.execute(insert).unwrap();
    assert!(result.success);
    let new_clip_id = result.result_data.unwrap()["clip_id"].as_str().unwrap().to_string();

    let clips = TimelineStore::list_clips_for_track(engine.store().connection(), &track_id).unwrap();
    let mut starts: Vec<(String, i64, i64)> = clips
        .iter()
        .map(|c| (c.name.clone(), c.timeline_start_frame, c.duration_frames))
        .collect();
    starts.sort_by_key(|(_, start, _)| *start);
    assert_eq!(
        starts,
        vec![
            ("a".to_string(), 0, 100),
            ("Clip".to_string(), 150, 50),
            ("b".to_string(), 200, 100),
            ("c".to_string(), 350, 50),
        ]
    );

    let key = StackKey::Sequence(sequence_id.clone());
    engine.undo(&key).unwrap();
    assert!(TimelineStore::get_clip(engine.store().connection(), &new_clip_id).is_err());
    let clips_after = TimelineStore::list_clips_for_track(engine.store().connection(), &track_id).unwrap();
    let mut after: Vec<(String, i64)> = clips_after
        .iter()
        .map(|c| (c.name.clone(), c.timeline_start_frame))
        .collect();
    after.sort_by_key(|(_, start)| *start);
    assert_eq!(
        after,
        vec![("a".to_string(), 0), ("b".to_string(), 150), ("c".to_string(), 300)]
    );
}

/// §8 scenario 5: video overlap is rejected, the sequence-number
/// allocator is not consumed (the next command gets the same number),
/// and the undo-tree head is unchanged.
#[test]
fn scenario_video_overlap_rolls_back_without_advancing_head() {
    let (mut engine, project_id, sequence_id, track_id) = setup();

    let create_a = env(
        &project_id,
        &sequence_id,
        "create_clip",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 0,
            "duration_frames": 100,
            "source_in_frame": 0,
            "source_out_frame": 100,
        }),
    );
    let result_a = engine.execute(create_a).unwrap();
    assert!(result_a.success);
    let key = StackKey::Sequence(sequence_id.clone());
    let head_before = engine.head(&key).unwrap();
    assert_eq!(head_before, Some(result_a.sequence_number));

    let create_b = env(
        &project_id,
        &sequence_id,
        "create_clip",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 50,
            "duration_frames": 100,
            "source_in_frame": 0,
            "source_out_frame": 100,
        }),
    );
    let result_b = engine.execute(create_b).unwrap();
    assert!(!result_b.success);
    assert!(!result_b.suppressed);

    // Head is unchanged and the next command reuses the same sequence
    // number the failed attempt would have consumed.
    assert_eq!(engine.head(&key).unwrap(), head_before);
    let create_c = env(
        &project_id,
        &sequence_id,
        "create_clip",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 200,
            "duration_frames": 100,
            "source_in_frame": 0,
            "source_out_frame": 100,
        }),
    );
    let result_c = engine.execute(create_c).unwrap();
    assert!(result_c.success);
    assert_eq!(result_c.sequence_number, head_before.unwrap() + 1);
}

/// §8: for every committed command C, replaying the active branch from
/// an empty store up to C reproduces the state observed right after C
/// executed live.
#[test]
fn scenario_replay_reconstruction_matches_live_state() {
    let (mut engine, project_id, sequence_id, track_id) = setup();

    let mut clip_ids = Vec::new();
    for start in [0i64, 100, 260] {
        let create = env(
            &project_id,
            &sequence_id,
            "create_clip",
            serde_json::json!({
                "track_id": track_id,
                "timeline_start_frame": start,
                "duration_frames": 100,
                "source_in_frame": 0,
                "source_out_frame": 100,
            }),
        );
        let result = engine.execute(create).unwrap();
        clip_ids.push(result.result_data.unwrap()["clip_id"].as_str().unwrap().to_string());
    }

    let split = env(
        &project_id,
        &sequence_id,
        "split_clip",
        serde_json::json!({ "clip_id": clip_ids[1], "split_time_frame": 150 }),
    );
    let split_result = engine.execute(split).unwrap();
    let target = split_result.sequence_number;

    let mut live = TimelineStore::list_clips_for_sequence(engine.store().connection(), &sequence_id).unwrap();
    live.sort_by_key(|c| c.timeline_start_frame);

    let mut replayed = engine.reconstruct_sequence(&sequence_id, target).unwrap();
    replayed.sort_by_key(|c| c.timeline_start_frame);

    assert_eq!(live.len(), replayed.len());
    for (a, b) in live.iter().zip(replayed.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.timeline_start_frame, b.timeline_start_frame);
        assert_eq!(a.duration_frames, b.duration_frames);
        assert_eq!(a.source_in_frame, b.source_in_frame);
        assert_eq!(a.source_out_frame, b.source_out_frame);
    }
}

/// §8: executing a new command after undo branches the history forest
/// instead of discarding the redo chain; `jump_to` can still reach the
/// abandoned branch via its lowest common ancestor with the new head.
#[test]
fn scenario_branching_and_jump_to_reaches_abandoned_branch() {
    let (mut engine, project_id, sequence_id, track_id) = setup();
    let key = StackKey::Sequence(sequence_id.clone());

    let create_a = env(
        &project_id,
        &sequence_id,
        "create_clip",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 0,
            "duration_frames": 100,
            "source_in_frame": 0,
            "source_out_frame": 100,
        }),
    );
    let root = engine.execute(create_a).unwrap().sequence_number;

    let create_b = env(
        &project_id,
        &sequence_id,
        "create_clip",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 200,
            "duration_frames": 50,
            "source_in_frame": 0,
            "source_out_frame": 50,
        }),
    );
    let branch_b = engine.execute(create_b).unwrap().sequence_number;

    // Undo back to the root, then execute a different command — this
    // creates a sibling branch rather than discarding `branch_b`.
    engine.undo(&key).unwrap();
    let create_c = env(
        &project_id,
        &sequence_id,
        "create_clip",
        serde_json::json!({
            "track_id": track_id,
            "timeline_start_frame": 400,
            "duration_frames": 50,
            "source_in_frame": 0,
            "source_out_frame": 50,
        }),
    );
    let branch_c = engine.execute(create_c).unwrap().sequence_number;
    assert_eq!(engine.head(&key).unwrap(), Some(branch_c));

    // `branch_b` still exists as an abandoned sibling of `branch_c`;
    // jumping to it undoes past the LCA (`root`) and redoes down the
    // old branch.
    engine.jump_to(&key, branch_b).unwrap();
    assert_eq!(engine.head(&key).unwrap(), Some(branch_b));
    let _ = root;
}
