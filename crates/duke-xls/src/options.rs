//! Options for workbooks created from scratch.

/// Values written into a fresh workbook's globals.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorkbookOptions {
    /// User name stored in WRITEACCESS.
    pub username: String,
    /// Country code stored in COUNTRY (both default and current).
    pub country: u16,
    /// Prefix for generated sheet names ("Sheet" gives "Sheet1", "Sheet2"...).
    pub sheet_name_prefix: String,
}

impl Default for WorkbookOptions {
    fn default() -> Self {
        Self {
            username: "duke-xls".to_string(),
            country: 1,
            sheet_name_prefix: "Sheet".to_string(),
        }
    }
}

impl WorkbookOptions {
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Generated name of the sheet at `index`.
    pub fn sheet_name(&self, index: usize) -> String {
        format!("{}{}", self.sheet_name_prefix, index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_sheet_names_are_one_based() {
        let opts = WorkbookOptions::default();
        assert_eq!(opts.sheet_name(0), "Sheet1");
        assert_eq!(opts.sheet_name(2), "Sheet3");
    }
}
