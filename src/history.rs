use crate::core::error::ChatError;
use crate::session::ChatMessage;
use std::fs;
use std::path::{Path, PathBuf};

const TRANSCRIPT_PREFIX: &str = "chat_history_";

/// `chat_history_<YYYYMMDD_HHMMSS>.json` for the current local time.
pub fn transcript_file_name() -> String {
    chrono::Local::now()
        .format("chat_history_%Y%m%d_%H%M%S.json")
        .to_string()
}

/// Writes `history` as an indented JSON array into `dir`, creating it if needed.
pub fn save_transcript(dir: &Path, history: &[ChatMessage]) -> Result<PathBuf, ChatError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(transcript_file_name());

    let file = fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, history)?;

    Ok(path)
}

pub fn load_transcript(path: &Path) -> Result<Vec<ChatMessage>, ChatError> {
    let file = fs::File::open(path)?;
    let messages = serde_json::from_reader(file)
        .map_err(|e| ChatError::Parse(format!("{}: {}", path.display(), e)))?;
    Ok(messages)
}

/// Transcript files in `dir`, oldest first. A missing directory has none.
pub fn list_transcripts(dir: &Path) -> Result<Vec<PathBuf>, ChatError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_file()
            && name.starts_with(TRANSCRIPT_PREFIX)
            && name.ends_with(".json")
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
