pub mod binary;
pub mod call_graph;
pub mod error;
pub mod gmon;
pub mod gprof_check;
pub mod program;
pub mod record;
pub mod symbol;

pub use binary::*;
pub use call_graph::*;
pub use error::GmonError;
pub use gmon::{GmonDecoder, GmonFormat, GmonProfile, Histogram};
pub use gprof_check::*;
pub use program::*;
pub use record::*;
pub use symbol::{FunctionSymbol, SymbolId, SymbolTable};
