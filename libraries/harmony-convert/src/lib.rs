//! Harmony Studio offline conversion pipeline
//!
//! This crate turns an arbitrary input audio file plus a set of mastering and
//! export parameters into a finished WAV payload.
//!
//! # Features
//!
//! - Table-driven mastering presets rendered as ffmpeg-style filter chains
//! - Loudness normalization stage appended after the mastering chain
//! - Optional time-range trim
//! - Lazily loaded, shared transcode engine with an explicit dispose
//! - Two engines: the `ffmpeg` binary and an in-process native renderer
//! - Sequential batch conversion and batch region export with progress
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────────┐
//! │ SourceAsset  │ ──► │ AudioConverter│ ──► │ ConversionResult │
//! └──────────────┘     └───────────────┘     └──────────────────┘
//!                         │         │
//!                         ▼         ▼
//!                ┌──────────────┐ ┌────────────────┐
//!                │ filter_graph │ │ EngineManager  │ ──► TranscodeEngine
//!                └──────────────┘ └────────────────┘     (ffmpeg | native)
//! ```
//!
//! - `filter_graph`: pure request → filter chain string builder
//! - `naming`: output file names
//! - `presets`: export presets (streaming platform targets)
//! - `engine`: engine trait, lifecycle manager and backends
//! - `converter`: single conversion orchestration
//! - `batch`: sequential batch orchestration with aggregate reports
//!
//! # Example
//!
//! ```ignore
//! use harmony_convert::{AudioConverter, ConversionRequest, EngineManager, MasteringSettings, SourceAsset};
//! use harmony_convert::engine::NativeLoader;
//! use std::sync::Arc;
//!
//! let engines = Arc::new(EngineManager::new(NativeLoader::new()));
//! let converter = AudioConverter::new(engines);
//!
//! let source = SourceAsset::load("take1.flac").await?;
//! let request = ConversionRequest::new(source, MasteringSettings::default());
//! let result = converter.convert(&request).await?;
//! println!("{} ({} bytes)", result.file_name, result.data.len());
//! ```

#![deny(unsafe_code)]

mod error;
mod types;

pub mod batch;
pub mod converter;
pub mod engine;
pub mod filter_graph;
pub mod naming;
pub mod presets;

pub use batch::{
    BatchConverter, BatchProgress, BatchReport, ItemFailure, ItemSuccess, Region, SkippedItem,
};
pub use converter::AudioConverter;
pub use engine::{EngineBackend, EngineManager, TranscodeCommand, TranscodeEngine};
pub use error::{ConvertError, Result};
pub use filter_graph::{build_filter_chain, FilterStage, MasteringPreset};
pub use presets::ExportPreset;
pub use types::*;
