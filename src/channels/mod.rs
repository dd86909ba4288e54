//! Message sources.

pub mod export;
pub mod telegram;

pub use export::ExportSource;
pub use telegram::TelegramSource;

use crate::config::SourceConfig;
use crate::pipeline::types::MessageSource;

/// Build the source described by `config`.
pub fn build_source(config: SourceConfig) -> Box<dyn MessageSource> {
    match config {
        SourceConfig::Telegram {
            bot_token,
            channel,
            api_base,
        } => Box::new(TelegramSource::with_api_base(bot_token, &channel, &api_base)),
        SourceConfig::Export { path, utc_offset } => {
            Box::new(ExportSource::with_utc_offset(path, utc_offset))
        }
    }
}
