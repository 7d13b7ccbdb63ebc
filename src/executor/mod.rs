/*!
Dispatch side of the relay.

- `render.rs`   -> `render`, `RenderedMessage` (feed item -> message, pure)
- `notifier.rs` -> `Notifier`, `DiscordNotifier`, `DryRunNotifier`
- `runtime.rs`  -> `Runtime` (one poll cycle: fetch, diff, dispatch, persist)
*/

pub mod notifier;
pub mod render;
pub mod runtime;

pub use notifier::{DiscordNotifier, DryRunNotifier, Notifier};
pub use render::{RenderedMessage, render};
pub use runtime::{CycleMode, CycleReport, Runtime};
