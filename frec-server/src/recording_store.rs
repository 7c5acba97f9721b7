//! Filesystem layout for recordings
//!
//! ```text
//! <root>/session_<id>/<speaker>_<file>.wav      committed recordings
//! <root>/session_<id>/<speaker>_<file>.txt      prompt read during the recording
//! <root>/lost/session_<id|unknown>/...          recordings whose metadata was not committed
//! <root>/staging/<uuid>/...                     written, not yet placed
//! ```
//!
//! Writes are two-phase. Every uploaded recording is first staged, then the
//! whole batch is moved into its session directory once metadata is
//! committed, or into the lost quarantine otherwise. Nothing here ever
//! deletes or overwrites audio: a name already taken gets a numeric suffix
//! (`Anna_take1_1.wav`).

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use frec_common::Result;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Transcript text written when no prompt could be resolved
pub const NO_PROMPT: &str = "No prompt.";

/// Placeholder for a missing speaker name or session id
pub const UNKNOWN: &str = "unknown";

const MAX_SLUG_CHARS: usize = 200;

/// Where a staged batch ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Metadata committed: normal session directory
    Session(i64),
    /// Metadata not committed: lost quarantine, keyed by an already committed
    /// session id when the submission matches one
    Lost(Option<i64>),
}

/// Session-scoped recording storage rooted at one directory
#[derive(Debug, Clone)]
pub struct RecordingStore {
    root: PathBuf,
}

impl RecordingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: i64) -> PathBuf {
        self.root.join(format!("session_{}", session_id))
    }

    pub fn lost_dir(&self, session_id: Option<i64>) -> PathBuf {
        let key = session_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        self.root.join("lost").join(format!("session_{}", key))
    }

    pub fn placement_dir(&self, placement: Placement) -> PathBuf {
        match placement {
            Placement::Session(id) => self.session_dir(id),
            Placement::Lost(id) => self.lost_dir(id),
        }
    }

    /// Create a fresh staging directory for one submission
    pub async fn open_staging(&self) -> Result<Staging> {
        let dir = self.root.join("staging").join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            error!(dir = %dir.display(), error = %e, "Failed to create staging directory");
            e
        })?;
        Ok(Staging {
            dir,
            staged: Vec::new(),
        })
    }

    /// Audio names already present in a placement directory.
    ///
    /// A lone transcript also reserves the audio name it pairs with.
    pub async fn existing_names(&self, placement: Placement) -> Result<HashSet<String>> {
        let dir = self.placement_dir(placement);
        let mut names = HashSet::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "Failed to list recording directory");
                return Err(e.into());
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".txt") {
                names.insert(format!("{}.wav", stem));
            }
            names.insert(name);
        }
        Ok(names)
    }

    /// Move every staged recording into its final directory.
    ///
    /// Returns the final audio paths. Existing files are never replaced: in
    /// the lost quarantine a taken name is suffixed, in a session directory
    /// it is an error since the committed rows already name the files. On
    /// any failure the remaining files stay in the staging directory.
    pub async fn place(&self, mut staging: Staging, placement: Placement) -> Result<Vec<PathBuf>> {
        let target = self.placement_dir(placement);
        tokio::fs::create_dir_all(&target).await.map_err(|e| {
            error!(dir = %target.display(), error = %e, "Failed to create recording directory");
            e
        })?;

        if let Placement::Lost(_) = placement {
            let taken = self.existing_names(placement).await?;
            staging.avoid_names(&taken).await?;
        }

        let mut placed = Vec::with_capacity(staging.staged.len());
        for recording in &staging.staged {
            let audio = target.join(&recording.file_name);
            let transcript = target.join(transcript_name(&recording.file_name));

            for (from, to) in [
                (&recording.audio_path, &audio),
                (&recording.transcript_path, &transcript),
            ] {
                move_no_clobber(from, to).await.map_err(|e| {
                    error!(
                        from = %from.display(),
                        to = %to.display(),
                        error = %e,
                        "Failed to move staged recording, leaving it in staging"
                    );
                    e
                })?;
            }
            placed.push(audio);
        }

        // Best effort; an empty leftover directory loses nothing
        if let Err(e) = tokio::fs::remove_dir(&staging.dir).await {
            debug!(dir = %staging.dir.display(), error = %e, "Staging directory not removed");
        }

        info!(
            dir = %target.display(),
            count = placed.len(),
            lost = matches!(placement, Placement::Lost(_)),
            "Placed recordings"
        );
        Ok(placed)
    }
}

/// One recording written to staging
#[derive(Debug, Clone)]
pub struct StagedRecording {
    /// Final basename of the audio file
    pub file_name: String,
    audio_path: PathBuf,
    transcript_path: PathBuf,
}

/// Staging directory for one submission
#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
    staged: Vec<StagedRecording>,
}

impl Staging {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn recordings(&self) -> &[StagedRecording] {
        &self.staged
    }

    /// Write audio and its transcript to staging.
    ///
    /// `prompt` of `None` writes [`NO_PROMPT`]. Uploads that slug to a name
    /// already staged get a numeric suffix.
    pub async fn stage(
        &mut self,
        speaker_name: Option<&str>,
        original_filename: &str,
        audio: &[u8],
        prompt: Option<&str>,
    ) -> Result<StagedRecording> {
        let mut file_name = recording_file_name(speaker_name, original_filename);
        let staged_names = self.staged_names();
        if staged_names.contains(&file_name) {
            file_name = free_name(&file_name, &staged_names);
        }
        let audio_path = self.dir.join(&file_name);
        let transcript_path = self.dir.join(transcript_name(&file_name));

        tokio::fs::write(&audio_path, audio).await.map_err(|e| {
            error!(path = %audio_path.display(), error = %e, "Failed to write recording");
            e
        })?;
        tokio::fs::write(&transcript_path, prompt.unwrap_or(NO_PROMPT))
            .await
            .map_err(|e| {
                error!(path = %transcript_path.display(), error = %e, "Failed to write transcript");
                e
            })?;

        let staged = StagedRecording {
            file_name,
            audio_path,
            transcript_path,
        };
        self.staged.push(staged.clone());
        Ok(staged)
    }

    /// Rename staged recordings whose names appear in `taken`.
    ///
    /// Must run before the names are written anywhere else, e.g. into
    /// recording rows.
    pub async fn avoid_names(&mut self, taken: &HashSet<String>) -> Result<()> {
        let mut in_use = self.staged_names();
        in_use.extend(taken.iter().cloned());

        for recording in self.staged.iter_mut() {
            if !taken.contains(&recording.file_name) {
                continue;
            }
            let renamed = free_name(&recording.file_name, &in_use);
            let audio_path = self.dir.join(&renamed);
            let transcript_path = self.dir.join(transcript_name(&renamed));

            tokio::fs::rename(&recording.audio_path, &audio_path).await?;
            tokio::fs::rename(&recording.transcript_path, &transcript_path).await?;
            debug!(from = %recording.file_name, to = %renamed, "Recording name taken, renamed");

            in_use.insert(renamed.clone());
            recording.file_name = renamed;
            recording.audio_path = audio_path;
            recording.transcript_path = transcript_path;
        }
        Ok(())
    }

    fn staged_names(&self) -> HashSet<String> {
        self.staged.iter().map(|s| s.file_name.clone()).collect()
    }
}

/// Link then unlink, so an existing `to` fails with `AlreadyExists`
async fn move_no_clobber(from: &Path, to: &Path) -> io::Result<()> {
    tokio::fs::hard_link(from, to).await?;
    tokio::fs::remove_file(from).await
}

/// `<slug(speaker)>_<slug(original)>`, always ending in lowercase `.wav`
pub fn recording_file_name(speaker_name: Option<&str>, original_filename: &str) -> String {
    let speaker = slug(speaker_name.unwrap_or(UNKNOWN));
    let file = slug(original_filename);
    format!("{}_{}.wav", speaker, wav_stem(&file))
}

fn wav_stem(file_name: &str) -> &str {
    let split = file_name.len().saturating_sub(4);
    match (file_name.get(..split), file_name.get(split..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".wav") => stem,
        _ => file_name,
    }
}

/// First `<stem>_<n>.wav` not in `in_use`
fn free_name(file_name: &str, in_use: &HashSet<String>) -> String {
    let stem = wav_stem(file_name);
    let mut n = 1u32;
    loop {
        let candidate = format!("{}_{}.wav", stem, n);
        if !in_use.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn transcript_name(audio_file_name: &str) -> String {
    match audio_file_name.rsplit_once('.') {
        Some((stem, _)) => format!("{}.txt", stem),
        None => format!("{}.txt", audio_file_name),
    }
}

/// Reduce untrusted text to a single safe path component.
///
/// Letters, digits, `-`, `_` and `.` are kept; separators, whitespace and
/// reserved characters become `_`; control characters are dropped. Leading
/// dots are stripped so the result is never `.`, `..` or hidden.
pub fn slug(input: &str) -> String {
    let mapped: String = input
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_SLUG_CHARS)
        .collect();

    let trimmed = mapped.trim_start_matches('.');
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}
