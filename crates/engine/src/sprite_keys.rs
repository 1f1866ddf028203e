use std::path::{Path, PathBuf};

use thiserror::Error;

const SPRITE_DIR: &str = "sprites";
const SPRITE_EXTENSION: &str = "png";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteKeyError {
    #[error("sprite key is empty")]
    Empty,
    #[error("sprite key '{key}' is absolute")]
    Absolute { key: String },
    #[error("sprite key '{key}' escapes the sprite directory")]
    ParentTraversal { key: String },
    #[error("sprite key '{key}' contains invalid character '{character}'")]
    InvalidCharacter { key: String, character: char },
}

/// Maps a sprite key such as `title` or `ui/arrow` to
/// `<asset_dir>/sprites/<key>.png`.
pub(crate) fn sprite_path(asset_dir: &Path, key: &str) -> Result<PathBuf, SpriteKeyError> {
    validate_sprite_key(key)?;
    Ok(asset_dir
        .join(SPRITE_DIR)
        .join(format!("{key}.{SPRITE_EXTENSION}")))
}

fn validate_sprite_key(key: &str) -> Result<(), SpriteKeyError> {
    if key.is_empty() {
        return Err(SpriteKeyError::Empty);
    }
    if key.starts_with('/') {
        return Err(SpriteKeyError::Absolute {
            key: key.to_string(),
        });
    }
    if key.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(SpriteKeyError::ParentTraversal {
            key: key.to_string(),
        });
    }
    if let Some(character) = key
        .chars()
        .find(|ch| !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '/' | '-')))
    {
        return Err(SpriteKeyError::InvalidCharacter {
            key: key.to_string(),
            character,
        });
    }
    Ok(())
}
