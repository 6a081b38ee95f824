#![allow(non_snake_case)]

// Базовые модули
pub mod error;
pub mod escape;
pub mod ordered_map;
pub mod metrics;
pub mod config;

// Формат файла снапшотов (папка с mod.rs)
pub mod codec; // src/codec/{mod,line_reader,reader,writer}.rs
pub mod snapshot;
pub mod snapshot_file;
pub mod gc;

// Переписывание исходников
pub mod call;
pub mod literals;
pub mod source_file;
pub mod comment_tracker;
pub mod mode;
pub mod write_tracker;

// Файловая система, раскладка, блокировка
pub mod fs;
pub mod layout;
pub mod lock;

// Движок и API ассертов
pub mod progress;
pub mod system;
pub mod selfie;
pub mod maintenance;

// Удобные реэкспорты
pub use call::{CallLocation, CallStack};
pub use config::SelfieConfig;
pub use error::SelfieError;
pub use mode::Mode;
pub use snapshot::{Snapshot, SnapshotValue};
pub use snapshot_file::SnapshotFile;
pub use system::{DiskStorage, SnapshotSystem, SuiteReport, TestDisk};
pub use selfie::{
    expect_selfie, expect_selfie_bool, expect_selfie_bytes, expect_selfie_int, expect_selfie_json,
    expect_selfie_repr, expect_selfie_snapshot, preserve_selfies_on_disk,
};
