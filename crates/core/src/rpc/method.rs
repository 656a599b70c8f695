/// Whether a method interacts with the client-side edit batch before its
/// own request goes out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushClass {
	/// Enqueues into the edit batch instead of sending directly.
	Batching,
	/// Depends on prior edits being applied; the batch is flushed to the
	/// wire strictly before this request.
	Flushing,
	/// Pure query or editor tooling; never forces a flush.
	NonFlushing,
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Method {
	Unknown,
	Ping,
	NewWorkbook,
	LoadFromXlsxBytes,
	LoadFromEncryptedXlsxBytes,
	SetCell,
	SetCells,
	SetCellRich,
	SetRange,
	SetSheetDimensions,
	GetSheetDimensions,
	Recalculate,
	GetCell,
	GetCellRich,
	GetRangeCompact,
	InternStyle,
	SetCellStyleId,
	SetRowStyleId,
	SetColStyleId,
	SetSheetDefaultStyleId,
	SetColWidth,
	SetColWidthChars,
	SetColHidden,
	SetFormatRunsByCol,
	SetSheetOrigin,
	ApplyOperation,
	GoalSeek,
	SetEngineInfo,
	SupportedLocaleIds,
	GetLocaleInfo,
	LexFormula,
	LexFormulaPartial,
	ParseFormulaPartial,
	GetWorkbookInfo,
}

impl Method {
	pub fn parse<S>(s: S) -> Self
	where
		S: AsRef<str>,
	{
		match s.as_ref() {
			"ping" => Self::Ping,
			"newWorkbook" => Self::NewWorkbook,
			"loadFromXlsxBytes" => Self::LoadFromXlsxBytes,
			"loadFromEncryptedXlsxBytes" => Self::LoadFromEncryptedXlsxBytes,
			"setCell" => Self::SetCell,
			"setCells" => Self::SetCells,
			"setCellRich" => Self::SetCellRich,
			"setRange" => Self::SetRange,
			"setSheetDimensions" => Self::SetSheetDimensions,
			"getSheetDimensions" => Self::GetSheetDimensions,
			"recalculate" => Self::Recalculate,
			"getCell" => Self::GetCell,
			"getCellRich" => Self::GetCellRich,
			"getRangeCompact" => Self::GetRangeCompact,
			"internStyle" => Self::InternStyle,
			"setCellStyleId" => Self::SetCellStyleId,
			"setRowStyleId" => Self::SetRowStyleId,
			"setColStyleId" => Self::SetColStyleId,
			"setSheetDefaultStyleId" => Self::SetSheetDefaultStyleId,
			"setColWidth" => Self::SetColWidth,
			"setColWidthChars" => Self::SetColWidthChars,
			"setColHidden" => Self::SetColHidden,
			"setFormatRunsByCol" => Self::SetFormatRunsByCol,
			"setSheetOrigin" => Self::SetSheetOrigin,
			"applyOperation" => Self::ApplyOperation,
			"goalSeek" => Self::GoalSeek,
			"setEngineInfo" => Self::SetEngineInfo,
			"supportedLocaleIds" => Self::SupportedLocaleIds,
			"getLocaleInfo" => Self::GetLocaleInfo,
			"lexFormula" => Self::LexFormula,
			"lexFormulaPartial" => Self::LexFormulaPartial,
			"parseFormulaPartial" => Self::ParseFormulaPartial,
			"getWorkbookInfo" => Self::GetWorkbookInfo,
			_ => Self::Unknown,
		}
	}
}

impl Method {
	pub fn to_str(&self) -> &str {
		match self {
			Self::Unknown => "unknown",
			Self::Ping => "ping",
			Self::NewWorkbook => "newWorkbook",
			Self::LoadFromXlsxBytes => "loadFromXlsxBytes",
			Self::LoadFromEncryptedXlsxBytes => "loadFromEncryptedXlsxBytes",
			Self::SetCell => "setCell",
			Self::SetCells => "setCells",
			Self::SetCellRich => "setCellRich",
			Self::SetRange => "setRange",
			Self::SetSheetDimensions => "setSheetDimensions",
			Self::GetSheetDimensions => "getSheetDimensions",
			Self::Recalculate => "recalculate",
			Self::GetCell => "getCell",
			Self::GetCellRich => "getCellRich",
			Self::GetRangeCompact => "getRangeCompact",
			Self::InternStyle => "internStyle",
			Self::SetCellStyleId => "setCellStyleId",
			Self::SetRowStyleId => "setRowStyleId",
			Self::SetColStyleId => "setColStyleId",
			Self::SetSheetDefaultStyleId => "setSheetDefaultStyleId",
			Self::SetColWidth => "setColWidth",
			Self::SetColWidthChars => "setColWidthChars",
			Self::SetColHidden => "setColHidden",
			Self::SetFormatRunsByCol => "setFormatRunsByCol",
			Self::SetSheetOrigin => "setSheetOrigin",
			Self::ApplyOperation => "applyOperation",
			Self::GoalSeek => "goalSeek",
			Self::SetEngineInfo => "setEngineInfo",
			Self::SupportedLocaleIds => "supportedLocaleIds",
			Self::GetLocaleInfo => "getLocaleInfo",
			Self::LexFormula => "lexFormula",
			Self::LexFormulaPartial => "lexFormulaPartial",
			Self::ParseFormulaPartial => "parseFormulaPartial",
			Self::GetWorkbookInfo => "getWorkbookInfo",
		}
	}
}

impl Method {
	pub fn is_valid(&self) -> bool {
		!matches!(self, Self::Unknown)
	}

	/// How this method interacts with the micro-batched edit buffer.
	pub fn flush_class(&self) -> FlushClass {
		match self {
			Self::SetCell => FlushClass::Batching,
			Self::NewWorkbook
			| Self::LoadFromXlsxBytes
			| Self::LoadFromEncryptedXlsxBytes
			| Self::SetCells
			| Self::SetCellRich
			| Self::SetRange
			| Self::SetSheetDimensions
			| Self::Recalculate
			| Self::SetCellStyleId
			| Self::SetRowStyleId
			| Self::SetColStyleId
			| Self::SetSheetDefaultStyleId
			| Self::SetColWidth
			| Self::SetColWidthChars
			| Self::SetColHidden
			| Self::SetFormatRunsByCol
			| Self::SetSheetOrigin
			| Self::ApplyOperation
			| Self::GoalSeek
			| Self::SetEngineInfo => FlushClass::Flushing,
			Self::Unknown
			| Self::Ping
			| Self::GetSheetDimensions
			| Self::GetCell
			| Self::GetCellRich
			| Self::GetRangeCompact
			| Self::InternStyle
			| Self::SupportedLocaleIds
			| Self::GetLocaleInfo
			| Self::LexFormula
			| Self::LexFormulaPartial
			| Self::ParseFormulaPartial
			| Self::GetWorkbookInfo => FlushClass::NonFlushing,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const ALL: &[Method] = &[
		Method::Ping,
		Method::NewWorkbook,
		Method::LoadFromXlsxBytes,
		Method::LoadFromEncryptedXlsxBytes,
		Method::SetCell,
		Method::SetCells,
		Method::SetCellRich,
		Method::SetRange,
		Method::SetSheetDimensions,
		Method::GetSheetDimensions,
		Method::Recalculate,
		Method::GetCell,
		Method::GetCellRich,
		Method::GetRangeCompact,
		Method::InternStyle,
		Method::SetCellStyleId,
		Method::SetRowStyleId,
		Method::SetColStyleId,
		Method::SetSheetDefaultStyleId,
		Method::SetColWidth,
		Method::SetColWidthChars,
		Method::SetColHidden,
		Method::SetFormatRunsByCol,
		Method::SetSheetOrigin,
		Method::ApplyOperation,
		Method::GoalSeek,
		Method::SetEngineInfo,
		Method::SupportedLocaleIds,
		Method::GetLocaleInfo,
		Method::LexFormula,
		Method::LexFormulaPartial,
		Method::ParseFormulaPartial,
		Method::GetWorkbookInfo,
	];

	#[test]
	fn all_variants_round_trip_through_names() {
		for method in ALL {
			assert_eq!(*method, Method::parse(method.to_str()));
		}
	}

	#[test]
	fn unknown_from_unrecognized_name() {
		assert_eq!(Method::Unknown, Method::parse("frobnicate"));
		// method names are matched exactly, not case-folded
		assert_eq!(Method::Unknown, Method::parse("SETCELLS"));
	}

	#[test]
	fn queries_never_flush() {
		for method in [Method::GetCell, Method::LexFormula, Method::Ping, Method::InternStyle] {
			assert_eq!(method.flush_class(), FlushClass::NonFlushing);
		}
	}

	#[test]
	fn edits_flush() {
		for method in [Method::SetCells, Method::LoadFromXlsxBytes, Method::ApplyOperation] {
			assert_eq!(method.flush_class(), FlushClass::Flushing);
		}
		assert_eq!(Method::SetCell.flush_class(), FlushClass::Batching);
	}
}
