//! Image budget planning under a hard wall-clock deadline.
//!
//! The invocation has a fixed maximum runtime; whatever time the model call
//! and translation already consumed is gone. This planner converts the time
//! still available into a count of images worth attempting, so timeout
//! pressure is handled by sizing the fan-out up front rather than by
//! cancelling in-flight work.

use tracing::info;

/// Hard cap on images per request, bounding fan-out and downstream cost.
pub const MAX_IMAGES_PER_REQUEST: usize = 10;

/// Computes how many step images can still be attempted.
///
/// `remaining = deadline - elapsed - buffer`; zero when no time remains,
/// otherwise `floor(remaining / seconds_per_image)` capped at
/// [`MAX_IMAGES_PER_REQUEST`]. Pure; defaults live in
/// [`crate::config::ChatConfig`].
#[must_use]
pub fn compute_image_budget(
    elapsed_seconds: f64,
    deadline_seconds: f64,
    buffer_seconds: f64,
    seconds_per_image: f64,
) -> usize {
    let remaining = deadline_seconds - elapsed_seconds - buffer_seconds;
    if remaining <= 0.0 || seconds_per_image <= 0.0 {
        info!(elapsed_s = elapsed_seconds, remaining_s = remaining, budget = 0usize, "Image budget calculated");
        return 0;
    }

    let affordable = (remaining / seconds_per_image).floor() as usize;
    let budget = affordable.min(MAX_IMAGES_PER_REQUEST);
    info!(elapsed_s = elapsed_seconds, remaining_s = remaining, budget, "Image budget calculated");
    budget
}
