//! Self-describing tabular dataset format: layout/page/stream model with
//! namelist text headers, binary and ASCII page bodies, and pluggable
//! compressed stream backends.

pub mod codec;
pub mod copy;
pub mod dataset;
pub mod error;
pub mod io;
pub mod layout;
pub mod lock;
pub mod mpi;
pub mod setters;
pub mod stream;
pub mod types;

pub use dataset::{ArrayInstance, Dataset, Page, StreamRole};
pub use error::{ErrorChain, SdsError, SdsResult};
pub use layout::{ArrayDef, AssociateDef, ByteOrder, ColumnDef, DataMode, Layout, ParameterDef};
pub use setters::Target;
pub use types::{Type, Value};
