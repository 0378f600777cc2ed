//! Operations core: record types, request payloads and the table schema.

pub mod payload;
pub mod schema;
pub mod types;

pub use payload::{
    parse_body, FieldError, LocSegment, NewOperation, NewOperationBody, OperationPatch, Payload,
};
pub use schema::{columns, ColumnConstraint, ColumnDef, ColumnType, TableDef, OPERATION_TABLE};
pub use types::{Operation, OperationId};
