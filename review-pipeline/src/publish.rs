//! Annotation publishing: line-anchored comment with one-shot fallback.
//!
//! Exactly one line-anchored attempt is made per hunk. On any failure
//! (missing credential, rejected position, missing line numbers), exactly one
//! fallback top-level note is posted instead, prefixed with an explicit
//! notice so the reviewer knows placement failed rather than seeing silence.

use tracing::{info, warn};

use crate::diff::LinePosition;
use crate::errors::PublishError;
use crate::gateway::{ChangeRequestRef, CommentPosition, ShaTriple, VcsGateway};

/// Prefix of the fallback note, ahead of the original review text.
pub const FALLBACK_NOTICE: &str =
    "Note: this review could not be attached to the exact line; please match \
     it to the change manually.";

/// How the annotation ended up on the merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// Line-anchored comment landed.
    Inline,
    /// Line placement failed; the top-level fallback note landed.
    FallbackNote,
}

/// Publishes one review text for one hunk.
///
/// # Errors
/// Only when the fallback note fails as well; the caller logs it and moves
/// on to the next hunk.
pub async fn publish_annotation<G: VcsGateway>(
    gateway: &G,
    id: &ChangeRequestRef,
    review_text: &str,
    position: LinePosition,
    old_path: &str,
    new_path: &str,
    sha: &ShaTriple,
) -> Result<Published, PublishError> {
    if position.is_known() {
        let comment_position = CommentPosition {
            sha: sha.clone(),
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
            old_line: position.old_line,
            new_line: position.new_line,
        };

        match gateway
            .post_line_comment(id, review_text, &comment_position)
            .await
        {
            Ok(()) => {
                info!(
                    path = new_path,
                    old_line = ?position.old_line,
                    new_line = ?position.new_line,
                    "annotation placed inline"
                );
                return Ok(Published::Inline);
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = new_path,
                    "inline annotation failed, falling back to top-level note"
                );
            }
        }
    } else {
        warn!(
            path = new_path,
            "no line numbers derived for hunk, falling back to top-level note"
        );
    }

    let body = format!("{}\n\n{}", FALLBACK_NOTICE, review_text);
    gateway
        .post_note(id, &body)
        .await
        .map_err(|e| PublishError::FallbackFailed(e.to_string()))?;

    Ok(Published::FallbackNote)
}
