pub mod algebra;
pub mod ast;
pub mod engine;
pub mod errors;
pub mod parser;
pub mod value;


pub use algebra::parse_table;
pub use engine::{combine, Engine, Limits, TableStore, Verdict};
pub use errors::{Error, EvalError, Result};
pub use parser::{parse_condition, parse_query};
pub use value::{Table, Tuple, Value};
