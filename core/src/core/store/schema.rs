//! Schema DDL, applied once via `execute_batch` on open. Constraints
//! that the Rust layer also checks (video overlap) are mirrored here as
//! triggers so a write that bypasses `TimelineStore`'s methods — a
//! stray `conn.execute` during debugging, say — still fails loudly
//! instead of corrupting the timeline silently.

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL CHECK (length(name) > 0),
    settings    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    modified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS media (
    id              TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    file_path       TEXT NOT NULL UNIQUE,
    duration_frames INTEGER NOT NULL CHECK (duration_frames > 0),
    fps_numerator   INTEGER NOT NULL CHECK (fps_numerator > 0),
    fps_denominator INTEGER NOT NULL CHECK (fps_denominator > 0),
    width           INTEGER,
    height          INTEGER,
    audio_channels  INTEGER,
    codec           TEXT,
    metadata        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_media_project ON media(project_id);

CREATE TABLE IF NOT EXISTS sequences (
    id                       TEXT PRIMARY KEY,
    project_id               TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name                      TEXT NOT NULL,
    kind                      TEXT NOT NULL CHECK (kind IN ('timeline', 'compound', 'multicam')),
    fps_numerator             INTEGER NOT NULL CHECK (fps_numerator > 0),
    fps_denominator           INTEGER NOT NULL CHECK (fps_denominator > 0),
    audio_rate                INTEGER NOT NULL CHECK (audio_rate > 0),
    width                     INTEGER NOT NULL CHECK (width > 0),
    height                    INTEGER NOT NULL CHECK (height > 0),
    view_start_frame          INTEGER NOT NULL DEFAULT 0,
    view_duration_frames      INTEGER NOT NULL DEFAULT 0,
    playhead_frame            INTEGER NOT NULL DEFAULT 0,
    mark_in_frame             INTEGER,
    mark_out_frame            INTEGER,
    selection                 TEXT NOT NULL,
    current_sequence_number   INTEGER
);

CREATE INDEX IF NOT EXISTS idx_sequences_project ON sequences(project_id);

CREATE TABLE IF NOT EXISTS tracks (
    id          TEXT PRIMARY KEY,
    sequence_id TEXT NOT NULL REFERENCES sequences(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    track_type  TEXT NOT NULL CHECK (track_type IN ('VIDEO', 'AUDIO')),
    track_index INTEGER NOT NULL CHECK (track_index >= 1),
    enabled     INTEGER NOT NULL DEFAULT 1,
    locked      INTEGER NOT NULL DEFAULT 0,
    muted       INTEGER NOT NULL DEFAULT 0,
    soloed      INTEGER NOT NULL DEFAULT 0,
    volume      REAL NOT NULL DEFAULT 1.0,
    pan         REAL NOT NULL DEFAULT 0.0,
    UNIQUE (sequence_id, track_type, track_index)
);

CREATE TABLE IF NOT EXISTS clips (
    id                    TEXT PRIMARY KEY,
    project_id            TEXT NOT NULL,
    clip_kind             TEXT NOT NULL CHECK (clip_kind IN ('master', 'timeline')),
    source_sequence_id    TEXT,
    parent_clip_id        TEXT,
    owner_sequence_id     TEXT NOT NULL REFERENCES sequences(id) ON DELETE CASCADE,
    track_id              TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    media_id              TEXT REFERENCES media(id),
    name                  TEXT NOT NULL,
    timeline_start_frame  INTEGER NOT NULL,
    duration_frames       INTEGER NOT NULL CHECK (duration_frames > 0),
    source_in_frame       INTEGER NOT NULL CHECK (source_in_frame >= 0),
    source_out_frame      INTEGER NOT NULL,
    fps_numerator         INTEGER NOT NULL CHECK (fps_numerator > 0),
    fps_denominator       INTEGER NOT NULL CHECK (fps_denominator > 0),
    enabled               INTEGER NOT NULL DEFAULT 1,
    offline               INTEGER NOT NULL DEFAULT 0,
    mark_in_frame         INTEGER,
    mark_out_frame        INTEGER,
    playhead_frame        INTEGER,
    CHECK (source_out_frame >= source_in_frame + duration_frames)
);

CREATE INDEX IF NOT EXISTS idx_clips_track ON clips(track_id);
CREATE INDEX IF NOT EXISTS idx_clips_track_start ON clips(track_id, timeline_start_frame);
CREATE INDEX IF NOT EXISTS idx_clips_sequence ON clips(owner_sequence_id);

CREATE TABLE IF NOT EXISTS properties (
    id              TEXT PRIMARY KEY,
    clip_id         TEXT NOT NULL REFERENCES clips(id) ON DELETE CASCADE,
    property_name   TEXT NOT NULL,
    property_value  TEXT NOT NULL,
    property_type   TEXT NOT NULL,
    default_value   TEXT NOT NULL,
    UNIQUE (clip_id, property_name)
);

CREATE TABLE IF NOT EXISTS clip_links (
    link_group_id TEXT NOT NULL,
    clip_id       TEXT NOT NULL REFERENCES clips(id) ON DELETE CASCADE,
    role          TEXT NOT NULL CHECK (role IN ('video', 'audio')),
    time_offset   INTEGER NOT NULL DEFAULT 0,
    enabled       INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (link_group_id, clip_id)
);

CREATE TABLE IF NOT EXISTS commands (
    id                      TEXT PRIMARY KEY,
    parent_id               TEXT,
    sequence_number         INTEGER NOT NULL UNIQUE,
    parent_sequence_number  INTEGER,
    command_type            TEXT NOT NULL,
    command_args            TEXT NOT NULL,
    undo_group_id           TEXT,
    pre_hash                TEXT,
    post_hash               TEXT,
    timestamp               TEXT NOT NULL,
    selected_clips_pre      TEXT NOT NULL,
    selected_clips          TEXT NOT NULL,
    playhead_pre            INTEGER NOT NULL,
    playhead                INTEGER NOT NULL,
    sequence_id             TEXT NOT NULL REFERENCES sequences(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_commands_parent_seq ON commands(parent_sequence_number);
CREATE INDEX IF NOT EXISTS idx_commands_sequence ON commands(sequence_id, sequence_number);

CREATE TABLE IF NOT EXISTS snapshots (
    sequence_id     TEXT NOT NULL,
    sequence_number INTEGER NOT NULL,
    clip_state      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (sequence_id, sequence_number)
);

CREATE TABLE IF NOT EXISTS sequence_track_layouts (
    sequence_id  TEXT NOT NULL,
    track_id     TEXT NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    pixel_height INTEGER NOT NULL DEFAULT 60,
    PRIMARY KEY (sequence_id, track_id)
);

-- Backstop against direct writes that skip TimelineStore::check_video_overlap.
CREATE TRIGGER IF NOT EXISTS trg_no_video_overlap_insert
BEFORE INSERT ON clips
WHEN (SELECT track_type FROM tracks WHERE id = NEW.track_id) = 'VIDEO'
BEGIN
    SELECT RAISE(ABORT, 'video_overlap')
    WHERE EXISTS (
        SELECT 1 FROM clips
        WHERE track_id = NEW.track_id
          AND id != NEW.id
          AND NEW.timeline_start_frame < timeline_start_frame + duration_frames
          AND timeline_start_frame < NEW.timeline_start_frame + NEW.duration_frames
    );
END;

CREATE TRIGGER IF NOT EXISTS trg_no_video_overlap_update
BEFORE UPDATE OF timeline_start_frame, duration_frames, track_id ON clips
WHEN (SELECT track_type FROM tracks WHERE id = NEW.track_id) = 'VIDEO'
BEGIN
    SELECT RAISE(ABORT, 'video_overlap')
    WHERE EXISTS (
        SELECT 1 FROM clips
        WHERE track_id = NEW.track_id
          AND id != NEW.id
          AND NEW.timeline_start_frame < timeline_start_frame + duration_frames
          AND timeline_start_frame < NEW.timeline_start_frame + NEW.duration_frames
    );
END;
"#;
