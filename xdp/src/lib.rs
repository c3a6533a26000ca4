//! Binding lifecycle and per-processor telemetry for an XDP lightweight filter.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use xdp_lwf::*;
pub use xdp_pcw::PerProcessorCounters;
pub use xdp_rtl as rtl;
