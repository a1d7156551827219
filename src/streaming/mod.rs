/**
 * streaming/mod.rs
 * =================
 * Public module entrypoint for stream content inspection.
 *
 * Currently exposes:
 *   - classification: two-tier (byte signature, then content type) decision
 *     whether a probe response looks like live media.
 */
pub mod classification;

pub use classification::{
    ContentClassifier, MediaEvidence, Signature, SignatureAnchor, SignatureTable,
    DEFAULT_MEDIA_CONTENT_TYPES, DEFAULT_SNIFF_BYTES,
};
