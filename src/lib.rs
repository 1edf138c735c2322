//! # kb-sync
//!
//! Keeps Open WebUI knowledge bases in sync with local folders.
//!
//! Every subfolder of the root directory is one knowledge base, described by
//! its `kbconfig.yaml`. Each monitor cycle resolves (or creates) the remote
//! knowledge base, diffs local filenames against the remote inventory, and
//! pushes every missing file through upload → processing poll → attach.
//! Nothing is ever deleted remotely.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Scanner    │──▶│  Reconcile  │──▶│   Pipeline   │
//! │ folders+files│   │ local − rem │   │ upload/poll/ │
//! └──────────────┘   └──────▲──────┘   │    attach    │
//!                           │          └──────┬───────┘
//!                    ┌──────┴──────┐          │
//!                    │  Directory  │◀─────────┤
//!                    │ resolve KB  │          ▼
//!                    └─────────────┘   ┌──────────────┐
//!                                      │ RemoteService│
//!                                      │  (Open WebUI)│
//!                                      └──────────────┘
//! ```
//!
//! Two long-running units run as separate processes: `serve` supervises the
//! Open WebUI server, `ingest` runs the monitor loop. `run` starts both.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENWEBUI_API_KEY=sk-...
//! kbsync status                 # what would be uploaded
//! kbsync sync                   # one cycle
//! kbsync sync --folder manuals  # one cycle, one folder
//! kbsync run                    # server + ingestion, until SIGTERM
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`kb_config`] | Per-folder `kbconfig.yaml` |
//! | [`models`] | Core data types and the per-file state machine |
//! | [`error`] | Remote, folder, and file error taxonomy |
//! | [`scanner`] | Folder and file discovery |
//! | [`reconcile`] | Upload plan: local files missing remotely |
//! | [`remote`] | Remote service trait and the Open WebUI client |
//! | [`directory`] | Knowledge base name → id resolution |
//! | [`pipeline`] | Upload, poll, attach for each file |
//! | [`monitor`] | The periodic sync loop |
//! | [`supervisor`] | Server restart loop and unit launcher |
//! | [`shutdown`] | Signal-driven cooperative shutdown |
//! | [`lock`] | One instance per unit |
//! | [`logging`] | Tracing subscriber setup |
//! | [`status`] | Read-only status table and sync summary |

pub mod config;
pub mod directory;
pub mod error;
pub mod kb_config;
pub mod lock;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod reconcile;
pub mod remote;
pub mod scanner;
pub mod shutdown;
pub mod status;
pub mod supervisor;
