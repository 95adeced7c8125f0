/// Bluetooth temperature/humidity sensor acquisition.
///
/// Submodules, leaf-first:
/// - `validate`: physical plausibility bounds.
/// - `parse`: turns one line of helper output into a reading or status.
/// - `source`: runs the helper scripts and streams their output.
/// - `retry`: the retry/backoff loop tying the above together.

pub mod parse;
pub mod retry;
pub mod source;
pub mod validate;
