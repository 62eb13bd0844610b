// mailscan: mailing-address extraction and savings reports for recorder-office PDF batches
pub mod address;
pub mod anchor_parser;
pub mod config;
pub mod metrics;
pub mod pdf_extraction;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod system_pdf_renderer;
pub mod types;

pub use config::Config;
pub use pipeline::{AnchorRow, Pipeline};
pub use types::{MailscanError, PageRecord, Result};
