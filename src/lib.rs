//! # dce-fiche
//!
//! Turns a DCE archive (the ZIP of tender documents for one building lot)
//! and a Word template into a consultation document.
//!
//! The quantitative table (DQE / DPGF / bordereau) is located inside the
//! archive, its rows are normalized to seven canonical fields, and the
//! template's marker paragraphs are replaced by the caller's descriptive
//! text and by a formatted quantities table.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ Archive  │──▶│  Selector  │──▶│  Tabular   │──▶│  Normalizer  │
//! │  (ZIP)   │   │ (keywords) │   │ CSV / XLSX │   │ schema+rules │
//! └──────────┘   └────────────┘   └────────────┘   └──────┬───────┘
//!                                                         │ LineItems
//!                 ┌────────────┐   ┌────────────┐         ▼
//!                 │  .docx out │◀──│  Mutation  │◀── ConsultationRequest
//!                 └────────────┘   │ plan+apply │
//!                                  └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dce extract DCE_Residence_Les_Pins_Lot5.zip
//! dce build DCE_Residence_Les_Pins_Lot5.zip --template fiche.docx --out fiche.docx
//! dce analyze DCE_Residence_Les_Pins_Lot5.zip
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`archive`] | In-memory ZIP bundle |
//! | [`selector`] | Quantitative-table candidate scoring |
//! | [`tabular`] | CSV and spreadsheet reading |
//! | [`schema`] | Header → canonical field resolution |
//! | [`patterns`] | Dimension / performance inference rules |
//! | [`normalize`] | Raw rows → [`models::LineItem`] |
//! | [`pipeline`] | Archive → line items, document → line items |
//! | [`request`] | Consultation request and display fields |
//! | [`docx`] | WordprocessingML package and block model |
//! | [`mutation`] | Marker resolution and table edit plans |
//! | [`assemble`] | Template + request → `.docx` |
//! | [`extract`] | Plain-text extraction for analysis |
//! | [`classify`] | Keyword classifiers over the archive text |
//! | [`config`] | TOML configuration |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |

pub mod archive;
pub mod assemble;
pub mod classify;
pub mod config;
pub mod docx;
pub mod error;
pub mod extract;
pub mod models;
pub mod mutation;
pub mod normalize;
pub mod patterns;
pub mod pipeline;
pub mod request;
pub mod schema;
pub mod selector;
pub mod tabular;
