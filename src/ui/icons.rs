//! Status icons shared by the terminal renderers.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static PAUSED: Emoji<'_, '_> = Emoji("⏸️  ", "[||]");
pub static CANCELLED: Emoji<'_, '_> = Emoji("🚫 ", "[X]");
pub static BLOCKER: Emoji<'_, '_> = Emoji("🚧 ", "[BLOCK]");
pub static SECTION: Emoji<'_, '_> = Emoji("📄 ", "-");
pub static PROGRESS: Emoji<'_, '_> = Emoji("📊 ", "[PROG]");
