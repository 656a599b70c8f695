use serde::Serialize;

/// Formula-relevant locale settings: how numbers are written and how
/// function arguments are separated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Locale {
	pub id: &'static str,
	pub name: &'static str,
	pub decimal_separator: char,
	pub thousands_separator: char,
	pub argument_separator: char,
}

/// The locales the formula tooling ships with.
pub static LOCALES: &[Locale] = &[
	Locale {
		id: "en-US",
		name: "English (United States)",
		decimal_separator: '.',
		thousands_separator: ',',
		argument_separator: ',',
	},
	Locale {
		id: "en-GB",
		name: "English (United Kingdom)",
		decimal_separator: '.',
		thousands_separator: ',',
		argument_separator: ',',
	},
	Locale {
		id: "de-DE",
		name: "German (Germany)",
		decimal_separator: ',',
		thousands_separator: '.',
		argument_separator: ';',
	},
	Locale {
		id: "fr-FR",
		name: "French (France)",
		decimal_separator: ',',
		thousands_separator: ' ',
		argument_separator: ';',
	},
	Locale {
		id: "es-ES",
		name: "Spanish (Spain)",
		decimal_separator: ',',
		thousands_separator: '.',
		argument_separator: ';',
	},
	Locale {
		id: "ja-JP",
		name: "Japanese (Japan)",
		decimal_separator: '.',
		thousands_separator: ',',
		argument_separator: ',',
	},
];

/// The default locale used when none is requested.
pub const DEFAULT_LOCALE_ID: &str = "en-US";

pub fn supported_locale_ids() -> Vec<&'static str> {
	LOCALES.iter().map(|l| l.id).collect()
}

pub fn locale(id: &str) -> Option<&'static Locale> {
	LOCALES.iter().find(|l| l.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lookup_is_case_insensitive() {
		assert!(locale("de-de").is_some());
		assert!(locale("xx-XX").is_none());
	}

	#[test]
	fn default_is_supported() {
		assert!(supported_locale_ids().contains(&DEFAULT_LOCALE_ID));
	}
}
