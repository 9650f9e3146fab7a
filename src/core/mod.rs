// Core modules implementing the value model, wire conversion, and error modeling.
pub mod attr;
pub mod convert;
pub mod error;
pub mod pool;
pub mod set;
pub mod value;
