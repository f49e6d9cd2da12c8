//! Typed column access on record batches.

use deltalake::arrow::array::{
    Array, ArrowPrimitiveType, AsArray, PrimitiveArray, RecordBatch, StringArray,
};
use deltalake::arrow::datatypes::DataType;
use snafu::prelude::*;

use crate::error::{ColumnTypeSnafu, MissingColumnSnafu, NullValueSnafu, ReaderError};

pub(crate) fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, ReaderError> {
    let column = batch
        .column_by_name(name)
        .context(MissingColumnSnafu { column: name })?;
    column.as_string_opt::<i32>().context(ColumnTypeSnafu {
        column: name,
        expected: DataType::Utf8.to_string(),
        actual: column.data_type().to_string(),
    })
}

pub(crate) fn primitives<'a, T: ArrowPrimitiveType>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a PrimitiveArray<T>, ReaderError> {
    let column = batch
        .column_by_name(name)
        .context(MissingColumnSnafu { column: name })?;
    column.as_primitive_opt::<T>().context(ColumnTypeSnafu {
        column: name,
        expected: T::DATA_TYPE.to_string(),
        actual: column.data_type().to_string(),
    })
}

pub(crate) fn opt_string(array: &StringArray, row: usize) -> Option<String> {
    array.is_valid(row).then(|| array.value(row).to_string())
}

pub(crate) fn opt_value<T: ArrowPrimitiveType>(
    array: &PrimitiveArray<T>,
    row: usize,
) -> Option<T::Native> {
    array.is_valid(row).then(|| array.value(row))
}

pub(crate) fn required<T>(value: Option<T>, column: &str) -> Result<T, ReaderError> {
    value.context(NullValueSnafu { column })
}
