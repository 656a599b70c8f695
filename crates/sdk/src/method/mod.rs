//! The typed call surface, grouped by area.
mod cells;
mod formula;
mod sheets;
mod styles;
mod workbook;

pub use cells::SetCell;
pub use sheets::SheetDimensions;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::Result;

pub(crate) fn from_json<T>(value: Json) -> Result<T>
where
	T: DeserializeOwned,
{
	serde_json::from_value(value).map_err(Into::into)
}

#[cfg(test)]
mod tests;
