//! LFI record archives and LFA list archives.
//!
//! LFI is the storage layer of the FA format and of Meso-NH output files:
//! a flat archive of named articles made of 8-byte words. LFA is a simple
//! list of named integer, real or string arrays.
//!
//! Both archives follow the same lifecycle: open in read, append or write
//! mode, then close explicitly or on drop.

pub mod error;
pub mod lfa;
pub mod lfi;
pub mod words;

pub use error::{LfiError, LfiResult};
pub use lfa::{is_lfa, LfaData, LfaEntry, LfaFile};
pub use lfi::{check_name, is_lfi, Article, LfiFile, MAX_NAME_LEN, RECORD_WORDS};
