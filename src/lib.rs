//! attacca: a deterministic compiler from short musician instructions to
//! bounded, reversible project edits.
//!
//! An instruction like "make the chorus brighter but keep the melody exact"
//! travels a fixed pipeline: normalization, tokenization against a closed
//! lexicon, exhaustive parsing into a scored forest, margin-based
//! disambiguation, semantic composition, pragmatic resolution against the
//! project and the conversation, constraint typechecking, bounded planning,
//! and finally package compilation. The result is an [`edit::EditPackage`]:
//! the concrete operations, the exact diff they cause, the inverse diff that
//! undoes them, and a structured explanation of every choice made along the
//! way.
//!
//! Three properties hold everywhere:
//!
//! - **Deterministic.** The same utterance against the same snapshot, canon,
//!   and dialogue state always compiles to the same outcome, derived ids
//!   included. There is no network, no clock dependence in decisions, no
//!   randomness.
//! - **Asks, never guesses.** Ambiguous readings, unbound references, and
//!   near-tied plans come back as [`intent::resolve::ClarificationRequest`]
//!   values carrying a resume token; a musically consequential choice is
//!   never made silently.
//! - **Nothing applies itself.** Compilation only reads. A
//!   [`pipeline::ReadyEdit`] is inert until the caller commits it through a
//!   [`host::ProjectHost`], and every committed package can be reversed from
//!   its recorded inverse diff.
//!
//! ```no_run
//! use attacca::host::{MemoryProject, ProjectHost};
//! use attacca::pipeline::{CompileOutcome, Compiler};
//!
//! # fn demo(snapshot: attacca::project::model::ProjectSnapshot)
//! # -> attacca::error::CompileResult<()> {
//! let mut host = MemoryProject::new(snapshot);
//! let mut compiler = Compiler::new()?;
//! match compiler.compile(&host, "make the chorus brighter")? {
//!     CompileOutcome::Ready(ready) => {
//!         println!("{}", ready.package.summary);
//!         compiler.commit(&mut host, &ready)?;
//!     }
//!     other => println!("{}", other.render()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod canon;
pub mod config;
pub mod edit;
pub mod error;
pub mod explain;
pub mod host;
pub mod intent;
pub mod parser;
pub mod pipeline;
pub mod planner;
pub mod project;
pub mod session;

pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult};
pub use pipeline::{CompileOutcome, Compiler, ReadyEdit};
