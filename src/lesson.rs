//! Scene-by-scene narration of a lesson.
//!
//! A lesson advances to the next scene when the current narration ends.
//! All scenes are prefetched up front so later scenes are usually cached by
//! the time they are reached.

use crate::narrator::Narrator;
use crate::playback::Completion;
use crate::prefetch::preview;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonOutcome {
    /// Scenes the lesson advanced past, including ones whose audio failed.
    pub spoken: usize,
    /// A later `speak` or `cancel` took over before the lesson finished.
    pub interrupted: bool,
}

pub async fn narrate_scenes(narrator: &Narrator, scenes: &[String]) -> LessonOutcome {
    narrator.prefetch_all_scenes(scenes);

    let mut spoken = 0;
    for (index, scene) in scenes.iter().enumerate() {
        if scene.trim().is_empty() {
            continue;
        }
        match narrator.speak(scene).finished().await {
            Some(Completion::Ended) => {}
            Some(Completion::EndedAfterError(e)) => {
                warn!(scene = index, "Scene narrated with errors: {}", e);
            }
            Some(Completion::Failed(e)) => {
                // Skip the broken clip rather than stall the lesson.
                warn!(scene = index, "Scene audio failed, moving on: {}", e);
            }
            None => {
                info!(scene = index, "Lesson interrupted at '{}'", preview(scene));
                return LessonOutcome {
                    spoken,
                    interrupted: true,
                };
            }
        }
        spoken += 1;
    }

    LessonOutcome {
        spoken,
        interrupted: false,
    }
}
