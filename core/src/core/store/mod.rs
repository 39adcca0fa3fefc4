//! Persistent relational timeline store (rusqlite).
//!
//! Schema and CRUD live here; the command engine drives transactions
//! through [`TimelineStore::transaction`]. Helper functions take
//! `&rusqlite::Connection` so they work identically whether called
//! directly on the store or inside an open transaction (`Transaction`
//! derefs to `Connection`).

mod schema;

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::core::error::{CoreError, CoreResult};
use crate::core::model::{
    Clip, ClipKind, ClipLink, LinkRole, Media, Project, Property, SelectionSnapshot, Sequence,
    SequenceKind, Track, TrackType,
};
use crate::core::types::{ClipId, ProjectId, SequenceId, TrackId};

/// One row of the append-only event log.
#[derive(Clone, Debug)]
pub struct CommandRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub sequence_number: i64,
    pub parent_sequence_number: Option<i64>,
    pub command_type: String,
    pub command_args: serde_json::Value,
    pub undo_group_id: Option<String>,
    pub pre_hash: Option<String>,
    pub post_hash: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub selected_clips_pre: SelectionSnapshot,
    pub selected_clips: SelectionSnapshot,
    pub playhead_pre: i64,
    pub playhead: i64,
    pub sequence_id: SequenceId,
}

/// A cached reconstruction of a sequence's clip set at a known
/// sequence number.
#[derive(Clone, Debug)]
pub struct SnapshotRow {
    pub sequence_id: SequenceId,
    pub sequence_number: i64,
    pub clips: Vec<Clip>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The persistent timeline store.
pub struct TimelineStore {
    conn: Connection,
}

impl TimelineStore {
    /// Opens (creating if necessary) a database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::configure_and_init(conn)
    }

    /// Opens an in-memory database, for tests and ephemeral sessions.
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_and_init(conn)
    }

    fn configure_and_init(conn: Connection) -> CoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Opens a transaction. Callers must `commit()` or `rollback()`
    /// (dropping it rolls back).
    pub fn transaction(&mut self) -> CoreResult<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Direct connection access for read-only queries outside a
    /// transaction (e.g. loading the initial projection).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // =========================================================================
    // Projects
    // =========================================================================

    pub fn insert_project(conn: &Connection, project: &Project) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO projects (id, name, settings, created_at, modified_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.name,
                project.settings.to_string(),
                project.created_at.to_rfc3339(),
                project.modified_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_project(conn: &Connection, id: &ProjectId) -> CoreResult<Project> {
        conn.query_row(
            "SELECT id, name, settings, created_at, modified_at FROM projects WHERE id = ?1",
            params![id],
            |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    settings: parse_json_column(row.get::<_, String>(2)?),
                    created_at: parse_timestamp(row.get::<_, String>(3)?),
                    modified_at: parse_timestamp(row.get::<_, String>(4)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("project {id}")))
    }

    // =========================================================================
    // Media
    // =========================================================================

    pub fn insert_media(conn: &Connection, media: &Media) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO media (id, project_id, name, file_path, duration_frames, fps_numerator, fps_denominator, width, height, audio_channels, codec, metadata)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                media.id,
                media.project_id,
                media.name,
                media.file_path,
                media.duration_frames,
                media.fps_numerator,
                media.fps_denominator,
                media.width,
                media.height,
                media.audio_channels,
                media.codec,
                media.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn get_media(conn: &Connection, id: &crate::core::types::MediaId) -> CoreResult<Media> {
        conn.query_row(
            "SELECT id, project_id, name, file_path, duration_frames, fps_numerator, fps_denominator, width, height, audio_channels, codec, metadata
             FROM media WHERE id = ?1",
            params![id],
            |row| {
                Ok(Media {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    file_path: row.get(3)?,
                    duration_frames: row.get(4)?,
                    fps_numerator: row.get(5)?,
                    fps_denominator: row.get(6)?,
                    width: row.get(7)?,
                    height: row.get(8)?,
                    audio_channels: row.get(9)?,
                    codec: row.get(10)?,
                    metadata: parse_json_column(row.get::<_, String>(11)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| CoreError::MediaNotFound(id.clone()))
    }

    // =========================================================================
    // Sequences
    // =========================================================================

    pub fn insert_sequence(conn: &Connection, seq: &Sequence) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO sequences (id, project_id, name, kind, fps_numerator, fps_denominator, audio_rate, width, height,
                view_start_frame, view_duration_frames, playhead_frame, mark_in_frame, mark_out_frame, selection, current_sequence_number)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                seq.id,
                seq.project_id,
                seq.name,
                kind_to_str(seq.kind),
                seq.fps_numerator,
                seq.fps_denominator,
                seq.audio_rate,
                seq.width,
                seq.height,
                seq.view_start_frame,
                seq.view_duration_frames,
                seq.playhead_frame,
                seq.mark_in_frame,
                seq.mark_out_frame,
                serde_json::to_string(&seq.selection)?,
                seq.current_sequence_number,
            ],
        )?;
        Ok(())
    }

    pub fn get_sequence(conn: &Connection, id: &SequenceId) -> CoreResult<Sequence> {
        conn.query_row(
            "SELECT id, project_id, name, kind, fps_numerator, fps_denominator, audio_rate, width, height,
                view_start_frame, view_duration_frames, playhead_frame, mark_in_frame, mark_out_frame, selection, current_sequence_number
             FROM sequences WHERE id = ?1",
            params![id],
            row_to_sequence,
        )
        .optional()?
        .ok_or_else(|| CoreError::SequenceNotFound(id.clone()))
    }

    pub fn set_sequence_head(
        conn: &Connection,
        id: &SequenceId,
        head: Option<i64>,
    ) -> CoreResult<()> {
        conn.execute(
            "UPDATE sequences SET current_sequence_number = ?1 WHERE id = ?2",
            params![head, id],
        )?;
        Ok(())
    }

    /// Persists the live playhead/selection onto the sequence row so
    /// they survive a restart, mirroring what the command log captured
    /// as this command's post-state.
    pub fn set_sequence_state(
        conn: &Connection,
        id: &SequenceId,
        playhead_frame: i64,
        selection: &crate::core::model::SelectionSnapshot,
    ) -> CoreResult<()> {
        conn.execute(
            "UPDATE sequences SET playhead_frame = ?1, selection = ?2 WHERE id = ?3",
            params![playhead_frame, serde_json::to_string(selection)?, id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Tracks
    // =========================================================================

    pub fn insert_track(conn: &Connection, track: &Track) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO tracks (id, sequence_id, name, track_type, track_index, enabled, locked, muted, soloed, volume, pan)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            params![
                track.id,
                track.sequence_id,
                track.name,
                track_type_to_str(track.track_type),
                track.track_index,
                track.enabled,
                track.locked,
                track.muted,
                track.soloed,
                track.volume,
                track.pan,
            ],
        )?;
        Ok(())
    }

    pub fn get_track(conn: &Connection, id: &TrackId) -> CoreResult<Track> {
        conn.query_row(
            "SELECT id, sequence_id, name, track_type, track_index, enabled, locked, muted, soloed, volume, pan
             FROM tracks WHERE id = ?1",
            params![id],
            row_to_track,
        )
        .optional()?
        .ok_or_else(|| CoreError::TrackNotFound(id.clone()))
    }

    pub fn list_tracks_for_sequence(
        conn: &Connection,
        sequence_id: &SequenceId,
    ) -> CoreResult<Vec<Track>> {
        let mut stmt = conn.prepare(
            "SELECT id, sequence_id, name, track_type, track_index, enabled, locked, muted, soloed, volume, pan
             FROM tracks WHERE sequence_id = ?1 ORDER BY track_type, track_index",
        )?;
        let rows = stmt
            .query_map(params![sequence_id], row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Clips
    // =========================================================================

    /// Inserts a clip, returning `Err(CoreError::VideoOverlap { .. })`
    /// with full conflict detail if it would overlap another clip on a
    /// VIDEO track. This is the primary enforcement path; the schema
    /// trigger (see `schema.rs`) is a backstop against writes that
    /// bypass this method.
    pub fn insert_clip(conn: &Connection, clip: &Clip) -> CoreResult<()> {
        Self::check_video_overlap(conn, clip)?;
        Self::raw_insert_clip(conn, clip)
    }

    fn raw_insert_clip(conn: &Connection, clip: &Clip) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO clips (id, project_id, clip_kind, source_sequence_id, parent_clip_id, owner_sequence_id, track_id, media_id,
                name, timeline_start_frame, duration_frames, source_in_frame, source_out_frame, fps_numerator, fps_denominator,
                enabled, offline, mark_in_frame, mark_out_frame, playhead_frame)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
            params![
                clip.id,
                clip.project_id,
                clip_kind_to_str(clip.clip_kind),
                clip.source_sequence_id,
                clip.parent_clip_id,
                clip.owner_sequence_id,
                clip.track_id,
                clip.media_id,
                clip.name,
                clip.timeline_start_frame,
                clip.duration_frames,
                clip.source_in_frame,
                clip.source_out_frame,
                clip.fps_numerator,
                clip.fps_denominator,
                clip.enabled,
                clip.offline,
                clip.mark_in_frame,
                clip.mark_out_frame,
                clip.playhead_frame,
            ],
        )?;
        Ok(())
    }

    /// Updates a clip's mutable fields. Same overlap enforcement as
    /// insert.
    pub fn update_clip(conn: &Connection, clip: &Clip) -> CoreResult<()> {
        Self::check_video_overlap(conn, clip)?;
        conn.execute(
            "UPDATE clips SET track_id=?2, name=?3, timeline_start_frame=?4, duration_frames=?5,
                source_in_frame=?6, source_out_frame=?7, fps_numerator=?8, fps_denominator=?9,
                enabled=?10, offline=?11, mark_in_frame=?12, mark_out_frame=?13, playhead_frame=?14
             WHERE id = ?1",
            params![
                clip.id,
                clip.track_id,
                clip.name,
                clip.timeline_start_frame,
                clip.duration_frames,
                clip.source_in_frame,
                clip.source_out_frame,
                clip.fps_numerator,
                clip.fps_denominator,
                clip.enabled,
                clip.offline,
                clip.mark_in_frame,
                clip.mark_out_frame,
                clip.playhead_frame,
            ],
        )?;
        Ok(())
    }

    pub fn delete_clip(conn: &Connection, id: &ClipId) -> CoreResult<()> {
        conn.execute("DELETE FROM clips WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn get_clip(conn: &Connection, id: &ClipId) -> CoreResult<Clip> {
        conn.query_row(
            "SELECT id, project_id, clip_kind, source_sequence_id, parent_clip_id, owner_sequence_id, track_id, media_id,
                name, timeline_start_frame, duration_frames, source_in_frame, source_out_frame, fps_numerator, fps_denominator,
                enabled, offline, mark_in_frame, mark_out_frame, playhead_frame
             FROM clips WHERE id = ?1",
            params![id],
            row_to_clip,
        )
        .optional()?
        .ok_or_else(|| CoreError::ClipNotFound(id.clone()))
    }

    pub fn list_clips_for_track(conn: &Connection, track_id: &TrackId) -> CoreResult<Vec<Clip>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, clip_kind, source_sequence_id, parent_clip_id, owner_sequence_id, track_id, media_id,
                name, timeline_start_frame, duration_frames, source_in_frame, source_out_frame, fps_numerator, fps_denominator,
                enabled, offline, mark_in_frame, mark_out_frame, playhead_frame
             FROM clips WHERE track_id = ?1 ORDER BY timeline_start_frame, id",
        )?;
        let rows = stmt
            .query_map(params![track_id], row_to_clip)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_clips_for_sequence(
        conn: &Connection,
        sequence_id: &SequenceId,
    ) -> CoreResult<Vec<Clip>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, clip_kind, source_sequence_id, parent_clip_id, owner_sequence_id, track_id, media_id,
                name, timeline_start_frame, duration_frames, source_in_frame, source_out_frame, fps_numerator, fps_denominator,
                enabled, offline, mark_in_frame, mark_out_frame, playhead_frame
             FROM clips WHERE owner_sequence_id = ?1 ORDER BY track_id, timeline_start_frame, id",
        )?;
        let rows = stmt
            .query_map(params![sequence_id], row_to_clip)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Shifts every clip on `track_id` whose `timeline_start_frame >=
    /// anchor` by `delta` frames. To avoid a transient overlap during
    /// the update loop, clips are updated in descending start order for
    /// positive deltas and ascending order for negative deltas — the
    /// same traversal-order rule ripple undo uses.
    pub fn bulk_shift_track(
        conn: &Connection,
        track_id: &TrackId,
        anchor: i64,
        delta: i64,
    ) -> CoreResult<Vec<ClipId>> {
        if delta == 0 {
            return Ok(Vec::new());
        }
        let order = if delta > 0 { "DESC" } else { "ASC" };
        let query = format!(
            "SELECT id FROM clips WHERE track_id = ?1 AND timeline_start_frame >= ?2 ORDER BY timeline_start_frame {order}"
        );
        let mut stmt = conn.prepare(&query)?;
        let ids: Vec<ClipId> = stmt
            .query_map(params![track_id, anchor], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for id in &ids {
            conn.execute(
                "UPDATE clips SET timeline_start_frame = timeline_start_frame + ?2 WHERE id = ?1",
                params![id, delta],
            )?;
        }
        Ok(ids)
    }

    /// As `bulk_shift_track`, but leaves every clip id in `excludes`
    /// untouched even if its start falls at or past `anchor`. Ripple
    /// edits use this on clips it has already placed by hand: their
    /// position must not move even though their (unchanged) start can
    /// sit exactly at the ripple point.
    pub fn bulk_shift_track_excluding(
        conn: &Connection,
        track_id: &TrackId,
        anchor: i64,
        delta: i64,
        excludes: &[ClipId],
    ) -> CoreResult<Vec<ClipId>> {
        if delta == 0 || excludes.is_empty() {
            return Self::bulk_shift_track(conn, track_id, anchor, delta);
        }
        let order = if delta > 0 { "DESC" } else { "ASC" };
        let placeholders: Vec<String> = (0..excludes.len()).map(|i| format!("?{}", i + 3)).collect();
        let query = format!(
            "SELECT id FROM clips WHERE track_id = ?1 AND timeline_start_frame >= ?2 AND id NOT IN ({}) ORDER BY timeline_start_frame {order}",
            placeholders.join(",")
        );
        let mut stmt = conn.prepare(&query)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![track_id, &anchor];
        for id in excludes {
            bound.push(id);
        }
        let ids: Vec<ClipId> = stmt
            .query_map(bound.as_slice(), |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for id in &ids {
            conn.execute(
                "UPDATE clips SET timeline_start_frame = timeline_start_frame + ?2 WHERE id = ?1",
                params![id, delta],
            )?;
        }
        Ok(ids)
    }

    fn check_video_overlap(conn: &Connection, clip: &Clip) -> CoreResult<()> {
        let track = Self::get_track(conn, &clip.track_id)?;
        if track.track_type != TrackType::Video {
            return Ok(());
        }
        let mut stmt = conn.prepare(
            "SELECT id, timeline_start_frame, duration_frames FROM clips
             WHERE track_id = ?1 AND id != ?2
               AND ?3 < timeline_start_frame + duration_frames
               AND timeline_start_frame < ?4",
        )?;
        let new_end = clip.timeline_start_frame + clip.duration_frames;
        let mut rows = stmt.query(params![
            clip.track_id,
            clip.id,
            clip.timeline_start_frame,
            new_end
        ])?;
        if let Some(row) = rows.next()? {
            let existing_id: String = row.get(0)?;
            let existing_start: i64 = row.get(1)?;
            let existing_dur: i64 = row.get(2)?;
            return Err(CoreError::VideoOverlap {
                track_id: clip.track_id.clone(),
                existing_clip_id: existing_id,
                existing_start,
                existing_end: existing_start + existing_dur,
                new_start: clip.timeline_start_frame,
                new_end,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn upsert_property(conn: &Connection, property: &Property) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO properties (id, clip_id, property_name, property_value, property_type, default_value)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(clip_id, property_name) DO UPDATE SET property_value = excluded.property_value",
            params![
                property.id,
                property.clip_id,
                property.property_name,
                property.property_value.to_string(),
                property.property_type,
                property.default_value.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn list_properties_for_clip(
        conn: &Connection,
        clip_id: &ClipId,
    ) -> CoreResult<Vec<Property>> {
        let mut stmt = conn.prepare(
            "SELECT id, clip_id, property_name, property_value, property_type, default_value
             FROM properties WHERE clip_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![clip_id], |row| {
                Ok(Property {
                    id: row.get(0)?,
                    clip_id: row.get(1)?,
                    property_name: row.get(2)?,
                    property_value: parse_json_column(row.get::<_, String>(3)?),
                    property_type: row.get(4)?,
                    default_value: parse_json_column(row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Clip links
    // =========================================================================

    pub fn upsert_clip_link(conn: &Connection, link: &ClipLink) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO clip_links (link_group_id, clip_id, role, time_offset, enabled)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(link_group_id, clip_id) DO UPDATE SET enabled = excluded.enabled, time_offset = excluded.time_offset",
            params![
                link.link_group_id,
                link.clip_id,
                link_role_to_str(link.role),
                link.time_offset,
                link.enabled,
            ],
        )?;
        Ok(())
    }

    pub fn list_links_for_sequence(
        conn: &Connection,
        sequence_id: &SequenceId,
    ) -> CoreResult<Vec<ClipLink>> {
        let mut stmt = conn.prepare(
            "SELECT cl.link_group_id, cl.clip_id, cl.role, cl.time_offset, cl.enabled
             FROM clip_links cl JOIN clips c ON c.id = cl.clip_id
             WHERE c.owner_sequence_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![sequence_id], |row| {
                Ok(ClipLink {
                    link_group_id: row.get(0)?,
                    clip_id: row.get(1)?,
                    role: str_to_link_role(&row.get::<_, String>(2)?),
                    time_offset: row.get(3)?,
                    enabled: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Event log (commands)
    // =========================================================================

    /// Returns the next free `sequence_number` (1-based, strictly
    /// increasing, globally unique).
    pub fn next_sequence_number(conn: &Connection) -> CoreResult<i64> {
        let max: Option<i64> =
            conn.query_row("SELECT MAX(sequence_number) FROM commands", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0) + 1)
    }

    pub fn append_command(conn: &Connection, row: &CommandRow) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO commands (id, parent_id, sequence_number, parent_sequence_number, command_type, command_args,
                undo_group_id, pre_hash, post_hash, timestamp, selected_clips_pre, selected_clips, playhead_pre, playhead, sequence_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                row.id,
                row.parent_id,
                row.sequence_number,
                row.parent_sequence_number,
                row.command_type,
                row.command_args.to_string(),
                row.undo_group_id,
                row.pre_hash,
                row.post_hash,
                row.timestamp.to_rfc3339(),
                serde_json::to_string(&row.selected_clips_pre)?,
                serde_json::to_string(&row.selected_clips)?,
                row.playhead_pre,
                row.playhead,
                row.sequence_id,
            ],
        )?;
        Ok(())
    }

    /// Deletes the command row for `sequence_number` (used by the
    /// engine to decrement the allocator after a failed commit — the
    /// row is never written in that path, this is for completeness
    /// when a caller needs to discard an uncommitted draft row).
    pub fn delete_command(conn: &Connection, sequence_number: i64) -> CoreResult<()> {
        conn.execute(
            "DELETE FROM commands WHERE sequence_number = ?1",
            params![sequence_number],
        )?;
        Ok(())
    }

    pub fn get_command(conn: &Connection, sequence_number: i64) -> CoreResult<CommandRow> {
        conn.query_row(
            "SELECT id, parent_id, sequence_number, parent_sequence_number, command_type, command_args,
                undo_group_id, pre_hash, post_hash, timestamp, selected_clips_pre, selected_clips, playhead_pre, playhead, sequence_id
             FROM commands WHERE sequence_number = ?1",
            params![sequence_number],
            row_to_command,
        )
        .optional()?
        .ok_or_else(|| CoreError::CommandNotFound(sequence_number.to_string()))
    }

    /// Children of `parent_sequence_number` (branches under a head),
    /// ordered by `sequence_number` ascending; redo picks the last.
    pub fn get_children(
        conn: &Connection,
        parent_sequence_number: i64,
    ) -> CoreResult<Vec<CommandRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, sequence_number, parent_sequence_number, command_type, command_args,
                undo_group_id, pre_hash, post_hash, timestamp, selected_clips_pre, selected_clips, playhead_pre, playhead, sequence_id
             FROM commands WHERE parent_sequence_number = ?1 ORDER BY sequence_number ASC",
        )?;
        let rows = stmt
            .query_map(params![parent_sequence_number], row_to_command)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Commands with no parent — the roots of the undo forest.
    /// Ordered by `sequence_number` ascending; redo-from-empty-history
    /// picks the last.
    pub fn get_root_commands(conn: &Connection) -> CoreResult<Vec<CommandRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, sequence_number, parent_sequence_number, command_type, command_args,
                undo_group_id, pre_hash, post_hash, timestamp, selected_clips_pre, selected_clips, playhead_pre, playhead, sequence_id
             FROM commands WHERE parent_sequence_number IS NULL ORDER BY sequence_number ASC",
        )?;
        let rows = stmt
            .query_map(params![], row_to_command)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Lists commands with `sequence_number > since`, ascending —
    /// used by replay's forward-scan once the active-branch chain is
    /// known.
    pub fn list_since(conn: &Connection, since: i64) -> CoreResult<Vec<CommandRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, parent_id, sequence_number, parent_sequence_number, command_type, command_args,
                undo_group_id, pre_hash, post_hash, timestamp, selected_clips_pre, selected_clips, playhead_pre, playhead, sequence_id
             FROM commands WHERE sequence_number > ?1 ORDER BY sequence_number ASC",
        )?;
        let rows = stmt
            .query_map(params![since], row_to_command)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn write_snapshot(
        conn: &Connection,
        sequence_id: &SequenceId,
        sequence_number: i64,
        clips: &[Clip],
    ) -> CoreResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (sequence_id, sequence_number, clip_state, created_at) VALUES (?1,?2,?3,?4)",
            params![
                sequence_id,
                sequence_number,
                serde_json::to_string(clips)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Returns the nearest snapshot at or before `target`, if any.
    pub fn nearest_snapshot(
        conn: &Connection,
        sequence_id: &SequenceId,
        target: i64,
    ) -> CoreResult<Option<SnapshotRow>> {
        conn.query_row(
            "SELECT sequence_id, sequence_number, clip_state, created_at FROM snapshots
             WHERE sequence_id = ?1 AND sequence_number <= ?2
             ORDER BY sequence_number DESC LIMIT 1",
            params![sequence_id, target],
            |row| {
                let clip_state: String = row.get(2)?;
                Ok(SnapshotRow {
                    sequence_id: row.get(0)?,
                    sequence_number: row.get(1)?,
                    clips: serde_json::from_str(&clip_state).unwrap_or_default(),
                    created_at: parse_timestamp(row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(CoreError::from)
    }

    /// All snapshot sequence numbers recorded for a sequence, ascending.
    /// Used by replay to pick the latest snapshot that actually lies on
    /// the target's ancestor path, since `nearest_snapshot` alone can't
    /// tell branches apart.
    pub fn snapshot_sequence_numbers(
        conn: &Connection,
        sequence_id: &SequenceId,
    ) -> CoreResult<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT sequence_number FROM snapshots WHERE sequence_id = ?1 ORDER BY sequence_number ASC",
        )?;
        let rows = stmt
            .query_map(params![sequence_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Loads a specific snapshot's clip state.
    pub fn get_snapshot(
        conn: &Connection,
        sequence_id: &SequenceId,
        sequence_number: i64,
    ) -> CoreResult<SnapshotRow> {
        conn.query_row(
            "SELECT sequence_id, sequence_number, clip_state, created_at FROM snapshots
             WHERE sequence_id = ?1 AND sequence_number = ?2",
            params![sequence_id, sequence_number],
            |row| {
                let clip_state: String = row.get(2)?;
                Ok(SnapshotRow {
                    sequence_id: row.get(0)?,
                    sequence_number: row.get(1)?,
                    clips: serde_json::from_str(&clip_state).unwrap_or_default(),
                    created_at: parse_timestamp(row.get::<_, String>(3)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("snapshot {sequence_id}@{sequence_number}")))
    }

    /// Deletes all clips owned by `sequence_id` — used by replay to
    /// clear the working set before restoring a snapshot and
    /// re-executing the active branch.
    pub fn clear_clips_for_sequence(conn: &Connection, sequence_id: &SequenceId) -> CoreResult<()> {
        conn.execute(
            "DELETE FROM clips WHERE owner_sequence_id = ?1",
            params![sequence_id],
        )?;
        Ok(())
    }
}

// =============================================================================
// Row <-> struct mapping helpers
// =============================================================================

fn parse_json_column(s: String) -> serde_json::Value {
    serde_json::from_str(&s).unwrap_or(serde_json::Value::Null)
}

fn parse_timestamp(s: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

fn kind_to_str(kind: SequenceKind) -> &'static str {
    match kind {
        SequenceKind::Timeline => "timeline",
        SequenceKind::Compound => "compound",
        SequenceKind::Multicam => "multicam",
    }
}

fn str_to_kind(s: &str) -> SequenceKind {
    match s {
        "compound" => SequenceKind::Compound,
        "multicam" => SequenceKind::Multicam,
        _ => SequenceKind::Timeline,
    }
}

fn track_type_to_str(t: TrackType) -> &'static str {
    match t {
        TrackType::Video => "VIDEO",
        TrackType::Audio => "AUDIO",
    }
}

fn str_to_track_type(s: &str) -> TrackType {
    match s {
        "AUDIO" => TrackType::Audio,
        _ => TrackType::Video,
    }
}

fn clip_kind_to_str(k: ClipKind) -> &'static str {
    match k {
        ClipKind::Master => "master",
        ClipKind::Timeline => "timeline",
    }
}

fn str_to_clip_kind(s: &str) -> ClipKind {
    match s {
        "master" => ClipKind::Master,
        _ => ClipKind::Timeline,
    }
}

fn link_role_to_str(r: LinkRole) -> &'static str {
    match r {
        LinkRole::Video => "video",
        LinkRole::Audio => "audio",
    }
}

fn str_to_link_role(s: &str) -> LinkRole {
    match s {
        "audio" => LinkRole::Audio,
        _ => LinkRole::Video,
    }
}

fn row_to_sequence(row: &rusqlite::Row) -> rusqlite::Result<Sequence> {
    let selection_json: String = row.get(14)?;
    Ok(Sequence {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        kind: str_to_kind(&row.get::<_, String>(3)?),
        fps_numerator: row.get(4)?,
        fps_denominator: row.get(5)?,
        audio_rate: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        view_start_frame: row.get(9)?,
        view_duration_frames: row.get(10)?,
        playhead_frame: row.get(11)?,
        mark_in_frame: row.get(12)?,
        mark_out_frame: row.get(13)?,
        selection: serde_json::from_str(&selection_json).unwrap_or_default(),
        current_sequence_number: row.get(15)?,
    })
}

fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        sequence_id: row.get(1)?,
        name: row.get(2)?,
        track_type: str_to_track_type(&row.get::<_, String>(3)?),
        track_index: row.get(4)?,
        enabled: row.get(5)?,
        locked: row.get(6)?,
        muted: row.get(7)?,
        soloed: row.get(8)?,
        volume: row.get(9)?,
        pan: row.get(10)?,
    })
}

fn row_to_clip(row: &rusqlite::Row) -> rusqlite::Result<Clip> {
    Ok(Clip {
        id: row.get(0)?,
        project_id: row.get(1)?,
        clip_kind: str_to_clip_kind(&row.get::<_, String>(2)?),
        source_sequence_id: row.get(3)?,
        parent_clip_id: row.get(4)?,
        owner_sequence_id: row.get(5)?,
        track_id: row.get(6)?,
        media_id: row.get(7)?,
        name: row.get(8)?,
        timeline_start_frame: row.get(9)?,
        duration_frames: row.get(10)?,
        source_in_frame: row.get(11)?,
        source_out_frame: row.get(12)?,
        fps_numerator: row.get(13)?,
        fps_denominator: row.get(14)?,
        enabled: row.get(15)?,
        offline: row.get(16)?,
        mark_in_frame: row.get(17)?,
        mark_out_frame: row.get(18)?,
        playhead_frame: row.get(19)?,
    })
}

fn row_to_command(row: &rusqlite::Row) -> rusqlite::Result<CommandRow> {
    let args: String = row.get(5)?;
    let selected_pre: String = row.get(10)?;
    let selected_post: String = row.get(11)?;
    Ok(CommandRow {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        sequence_number: row.get(2)?,
        parent_sequence_number: row.get(3)?,
        command_type: row.get(4)?,
        command_args: serde_json::from_str(&args).unwrap_or(serde_json::Value::Null),
        undo_group_id: row.get(6)?,
        pre_hash: row.get(7)?,
        post_hash: row.get(8)?,
        timestamp: parse_timestamp(row.get::<_, String>(9)?),
        selected_clips_pre: serde_json::from_str(&selected_pre).unwrap_or_default(),
        selected_clips: serde_json::from_str(&selected_post).unwrap_or_default(),
        playhead_pre: row.get(12)?,
        playhead: row.get(13)?,
        sequence_id: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Clip, ClipKind, Track, TrackType};

    fn sample_project() -> Project {
        Project::new("Test Project")
    }

    fn sample_clip(track_id: &str, start: i64, dur: i64) -> Clip {
        Clip {
            id: crate::core::types::new_id(),
            project_id: "proj".into(),
            clip_kind: ClipKind::Timeline,
            source_sequence_id: None,
            parent_clip_id: None,
            owner_sequence_id: "seq".into(),
            track_id: track_id.into(),
            media_id: None,
            name: "clip".into(),
            timeline_start_frame: start,
            duration_frames: dur,
            source_in_frame: 0,
            source_out_frame: dur,
            fps_numerator: 24,
            fps_denominator: 1,
            enabled: true,
            offline: false,
            mark_in_frame: None,
            mark_out_frame: None,
            playhead_frame: None,
        }
    }

    fn setup() -> (TimelineStore, Sequence, Track) {
        let store = TimelineStore::in_memory().unwrap();
        let project = sample_project();
        TimelineStore::insert_project(store.connection(), &project).unwrap();
        let mut seq = Sequence::new(project.id.clone(), "Seq 1", 24, 1);
        seq.id = "seq".into();
        TimelineStore::insert_sequence(store.connection(), &seq).unwrap();
        let track = Track::new(seq.id.clone(), TrackType::Video, 1);
        TimelineStore::insert_track(store.connection(), &track).unwrap();
        (store, seq, track)
    }

    #[test]
    fn insert_and_get_project_roundtrips() {
        let store = TimelineStore::in_memory().unwrap();
        let project = sample_project();
        TimelineStore::insert_project(store.connection(), &project).unwrap();
        let loaded = TimelineStore::get_project(store.connection(), &project.id).unwrap();
        assert_eq!(loaded.name, "Test Project");
    }

    #[test]
    fn clip_insert_and_list_roundtrips() {
        let (store, _seq, track) = setup();
        let clip = sample_clip(&track.id, 0, 100);
        TimelineStore::insert_clip(store.connection(), &clip).unwrap();
        let clips = TimelineStore::list_clips_for_track(store.connection(), &track.id).unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].duration_frames, 100);
    }

    #[test]
    fn video_overlap_is_rejected_with_distinct_error() {
        let (store, _seq, track) = setup();
        let a = sample_clip(&track.id, 0, 100);
        TimelineStore::insert_clip(store.connection(), &a).unwrap();
        let b = sample_clip(&track.id, 50, 100);
        let err = TimelineStore::insert_clip(store.connection(), &b).unwrap_err();
        assert_eq!(err.kind(), "VideoOverlap");
    }

    #[test]
    fn adjacent_clips_do_not_overlap() {
        let (store, _seq, track) = setup();
        let a = sample_clip(&track.id, 0, 100);
        TimelineStore::insert_clip(store.connection(), &a).unwrap();
        let b = sample_clip(&track.id, 100, 50);
        TimelineStore::insert_clip(store.connection(), &b).unwrap();
        let clips = TimelineStore::list_clips_for_track(store.connection(), &track.id).unwrap();
        assert_eq!(clips.len(), 2);
    }

    #[test]
    fn bulk_shift_moves_clips_at_or_after_anchor() {
        let (store, _seq, track) = setup();
        let a = sample_clip(&track.id, 0, 100);
        let b = sample_clip(&track.id, 150, 50);
        TimelineStore::insert_clip(store.connection(), &a).unwrap();
        TimelineStore::insert_clip(store.connection(), &b).unwrap();
        TimelineStore::bulk_shift_track(store.connection(), &track.id, 150, 50).unwrap();
        let clips = TimelineStore::list_clips_for_track(store.connection(), &track.id).unwrap();
        let shifted = clips.iter().find(|c| c.id == b.id).unwrap();
        assert_eq!(shifted.timeline_start_frame, 200);
        let untouched = clips.iter().find(|c| c.id == a.id).unwrap();
        assert_eq!(untouched.timeline_start_frame, 0);
    }

    #[test]
    fn transaction_rolls_back_on_drop() {
        let mut store = TimelineStore::in_memory().unwrap();
        let project = sample_project();
        {
            let tx = store.transaction().unwrap();
            TimelineStore::insert_project(&tx, &project).unwrap();
            // tx dropped without commit -> rollback
        }
        let err = TimelineStore::get_project(store.connection(), &project.id).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn transaction_persists_on_commit() {
        let mut store = TimelineStore::in_memory().unwrap();
        let project = sample_project();
        {
            let tx = store.transaction().unwrap();
            TimelineStore::insert_project(&tx, &project).unwrap();
            tx.commit().unwrap();
        }
        let loaded = TimelineStore::get_project(store.connection(), &project.id).unwrap();
        assert_eq!(loaded.id, project.id);
    }

    #[test]
    fn sequence_number_allocator_starts_at_one() {
        let store = TimelineStore::in_memory().unwrap();
        assert_eq!(TimelineStore::next_sequence_number(store.connection()).unwrap(), 1);
    }

    #[test]
    fn snapshot_nearest_at_or_before_target() {
        let (store, seq, _track) = setup();
        TimelineStore::write_snapshot(store.connection(), &seq.id, 5, &[]).unwrap();
        TimelineStore::write_snapshot(store.connection(), &seq.id, 10, &[]).unwrap();
        let found = TimelineStore::nearest_snapshot(store.connection(), &seq.id, 8)
            .unwrap()
            .unwrap();
        assert_eq!(found.sequence_number, 5);
    }
}
