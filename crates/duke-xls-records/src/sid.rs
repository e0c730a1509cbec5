//! BIFF8 record type constants ("sids").
//!
//! Reference: [MS-XLS] §2.3, Record Enumeration

// ── Stream structure ────────────────────────────────────────────────────
pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000A;
pub const CONTINUE: u16 = 0x003C;

// ── Workbook globals ────────────────────────────────────────────────────
pub const INTERFACEHDR: u16 = 0x00E1;
pub const MMS: u16 = 0x00C1;
pub const INTERFACEEND: u16 = 0x00E2;
pub const WRITEACCESS: u16 = 0x005C; // Name of the last user to save
pub const CODEPAGE: u16 = 0x0042; // Code page (1200 = UTF-16 for BIFF8)
pub const DSF: u16 = 0x0161; // Double stream file flag
pub const TABID: u16 = 0x013D; // Sheet tab id array
pub const FNGROUPCOUNT: u16 = 0x009C;
pub const WINDOWPROTECT: u16 = 0x0019;
pub const PROTECT: u16 = 0x0012;
pub const PASSWORD: u16 = 0x0013;
pub const PROT4REV: u16 = 0x01AF;
pub const PROT4REVPASS: u16 = 0x01BC;
pub const WINDOW1: u16 = 0x003D; // Workbook window position and tab state
pub const BACKUP: u16 = 0x0040;
pub const HIDEOBJ: u16 = 0x008D;
pub const DATEMODE: u16 = 0x0022; // 1900 vs 1904 date system (a.k.a. DATE1904)
pub const PRECISION: u16 = 0x000E;
pub const REFRESHALL: u16 = 0x01B7;
pub const BOOKBOOL: u16 = 0x00DA;
pub const FONT: u16 = 0x0031; // Font definition
pub const FORMAT: u16 = 0x041E; // Number format string
pub const XF: u16 = 0x00E0; // Extended Format (cell format record)
pub const STYLE: u16 = 0x0293; // Named cell style
pub const USESELFS: u16 = 0x0160;
pub const BOUNDSHEET: u16 = 0x0085; // Sheet name, type, visibility, stream offset
pub const COUNTRY: u16 = 0x008C;
pub const RECALCID: u16 = 0x01C1;
pub const SST: u16 = 0x00FC; // Shared String Table
pub const EXTSST: u16 = 0x00FF; // SST bucket index
pub const PALETTE: u16 = 0x0092; // Custom color palette (overrides default 56)
pub const FILESHARING: u16 = 0x005B; // Write reservation password and user
pub const WRITEPROT: u16 = 0x0086; // Workbook should be opened read-only
pub const MSODRAWINGGROUP: u16 = 0x00EB; // Escher drawing group container
pub const HLINK: u16 = 0x01B8; // Hyperlink
pub const BOOKEXT: u16 = 0x0863;

// ── Link table ──────────────────────────────────────────────────────────
pub const SUPBOOK: u16 = 0x01AE; // External (or internal) workbook reference
pub const EXTERNNAME: u16 = 0x0023; // Name defined in an external workbook / add-in
pub const XCT: u16 = 0x0059; // CRN count
pub const CRN: u16 = 0x005A; // Cached external cell values
pub const EXTERNSHEET: u16 = 0x0017; // XTI array: (supbook, first sheet, last sheet)
pub const NAME: u16 = 0x0018; // Defined name
pub const NAMECMT: u16 = 0x0894; // Defined name comment

// ── Sheet calculation settings ──────────────────────────────────────────
pub const INDEX: u16 = 0x020B; // Row block DBCELL offsets
pub const UNCALCED: u16 = 0x005E;
pub const CALCMODE: u16 = 0x000D;
pub const CALCCOUNT: u16 = 0x000C;
pub const REFMODE: u16 = 0x000F;
pub const ITERATION: u16 = 0x0011;
pub const DELTA: u16 = 0x0010;
pub const SAVERECALC: u16 = 0x005F;
pub const PRINTHEADERS: u16 = 0x002A;
pub const PRINTGRIDLINES: u16 = 0x002B;
pub const GRIDSET: u16 = 0x0082;
pub const GUTS: u16 = 0x0080; // Outline gutter sizes
pub const DEFAULTROWHEIGHT: u16 = 0x0225; // Default row height
pub const WSBOOL: u16 = 0x0081;
pub const SHEETEXT: u16 = 0x0862;

// ── Page settings ───────────────────────────────────────────────────────
pub const HORIZONTALPAGEBREAKS: u16 = 0x001B; // Row breaks
pub const VERTICALPAGEBREAKS: u16 = 0x001A; // Column breaks
pub const HEADER: u16 = 0x0014;
pub const FOOTER: u16 = 0x0015;
pub const HCENTER: u16 = 0x0083;
pub const VCENTER: u16 = 0x0084;
pub const LEFTMARGIN: u16 = 0x0026;
pub const RIGHTMARGIN: u16 = 0x0027;
pub const TOPMARGIN: u16 = 0x0028;
pub const BOTTOMMARGIN: u16 = 0x0029;
pub const PLS: u16 = 0x004D; // Printer settings blob
pub const SETUP: u16 = 0x00A1; // Print setup
pub const BITMAP: u16 = 0x00E9; // Background picture
pub const PRINTSIZE: u16 = 0x0033;
pub const HEADERFOOTER: u16 = 0x089C;

// ── Sheet protection ────────────────────────────────────────────────────
pub const OBJPROTECT: u16 = 0x0063;
pub const SCENPROTECT: u16 = 0x00DD;
pub const FEATHDR: u16 = 0x0867; // Shared feature header (also SHEETPROTECTION)
pub const FEAT: u16 = 0x0868;

// ── Sheet structure ─────────────────────────────────────────────────────
pub const DEFCOLWIDTH: u16 = 0x0055; // Default column width
pub const COLINFO: u16 = 0x007D; // Column width, visibility, default format
pub const STANDARDWIDTH: u16 = 0x0099;
pub const DIMENSION: u16 = 0x0200; // Used range (first/last row/col)
pub const ROW: u16 = 0x0208; // Row height, visibility, default format
pub const DBCELL: u16 = 0x00D7; // Offsets of the rows/cells of one row block
pub const WINDOW2: u16 = 0x023E; // Sheet view settings (freeze panes, etc.)
pub const SCL: u16 = 0x00A0; // Zoom
pub const PANE: u16 = 0x0041; // Pane split position
pub const SELECTION: u16 = 0x001D; // Selected cell range
pub const MERGECELLS: u16 = 0x00E5; // Merged cell ranges
pub const LABELRANGES: u16 = 0x015F;
pub const PHONETICPR: u16 = 0x00EF;
pub const CODENAME: u16 = 0x01BA;
pub const USERSVIEWBEGIN: u16 = 0x01AA; // Custom view start
pub const USERSVIEWEND: u16 = 0x01AB; // Custom view end
pub const SORT: u16 = 0x0090;
pub const AUTOFILTERINFO: u16 = 0x009D;
pub const AUTOFILTER: u16 = 0x009E;
pub const FILTERMODE: u16 = 0x009B;
pub const DCONREF: u16 = 0x0051;
pub const SXVIEW: u16 = 0x00B0; // Pivot table view
pub const CHARTFRTINFO: u16 = 0x0850;
pub const SHEETLAYOUT: u16 = 0x0862;
pub const PLV: u16 = 0x088B; // Page layout view
pub const DXF: u16 = 0x088D;

// ── Conditional formatting / data validation ───────────────────────────
pub const CFHEADER: u16 = 0x01B0;
pub const CFRULE: u16 = 0x01B1;
pub const CFHEADER12: u16 = 0x0879;
pub const CFRULE12: u16 = 0x087A;
pub const DVAL: u16 = 0x01B2; // Data validation header
pub const DV: u16 = 0x01BE; // Data validation criteria

// ── Drawing layer ───────────────────────────────────────────────────────
pub const MSODRAWING: u16 = 0x00EC; // Escher drawing (per sheet)
pub const MSODRAWINGSELECTION: u16 = 0x00ED;
pub const OBJ: u16 = 0x005D; // Drawing object properties
pub const TXO: u16 = 0x01B6; // Text box
pub const NOTE: u16 = 0x001C; // Cell comment anchor

// ── Cell records ────────────────────────────────────────────────────────
pub const LABELSST: u16 = 0x00FD; // Cell containing SST string index
pub const LABEL: u16 = 0x0204; // Cell with inline string (rare in BIFF8)
pub const NUMBER: u16 = 0x0203; // Cell with IEEE 754 double
pub const RK: u16 = 0x027E; // Cell with compressed number (RK encoding)
pub const MULRK: u16 = 0x00BD; // Multiple RK values in one row
pub const BLANK: u16 = 0x0201; // Empty cell with formatting
pub const MULBLANK: u16 = 0x00BE; // Multiple blanks with formatting
pub const BOOLERR: u16 = 0x0205; // Boolean or error cell
pub const FORMULA: u16 = 0x0006; // Formula cell with cached result
pub const STRING: u16 = 0x0207; // Cached string result for preceding FORMULA
pub const RSTRING: u16 = 0x00D6; // Rich-text inline string (rare)
pub const ARRAY: u16 = 0x0221; // Array formula
pub const SHRFMLA: u16 = 0x04BC; // Shared formula
pub const TABLE: u16 = 0x0236; // What-if data table

// ── BOF subtypes (the `dt` field) ───────────────────────────────────────
pub const BOF_WORKBOOK_GLOBALS: u16 = 0x0005;
pub const BOF_VB_MODULE: u16 = 0x0006;
pub const BOF_WORKSHEET: u16 = 0x0010;
pub const BOF_CHART: u16 = 0x0020;
pub const BOF_MACRO: u16 = 0x0040;
pub const BOF_WORKSPACE: u16 = 0x0100;

/// BIFF version we support.
pub const BIFF8_VERSION: u16 = 0x0600;

/// Largest body a single physical record may carry.
pub const MAX_RECORD_DATA_SIZE: usize = 8224;

/// Whether a CONTINUE following a record with this sid extends that record's body.
///
/// Records like OBJ and TXO are followed by CONTINUE records that belong to the
/// drawing layer and must stay separate.
pub fn is_continuable(sid: u16) -> bool {
    matches!(
        sid,
        SST | EXTERNSHEET
            | SUPBOOK
            | NAME
            | EXTERNNAME
            | MSODRAWINGGROUP
            | MSODRAWING
            | SHRFMLA
            | ARRAY
            | FEAT
    )
}

/// Human-readable name for a sid, used in record dumps.
pub fn name(sid: u16) -> &'static str {
    match sid {
        BOF => "BOF",
        EOF => "EOF",
        CONTINUE => "CONTINUE",
        INTERFACEHDR => "INTERFACEHDR",
        MMS => "MMS",
        INTERFACEEND => "INTERFACEEND",
        WRITEACCESS => "WRITEACCESS",
        CODEPAGE => "CODEPAGE",
        DSF => "DSF",
        TABID => "TABID",
        FNGROUPCOUNT => "FNGROUPCOUNT",
        WINDOWPROTECT => "WINDOWPROTECT",
        PROTECT => "PROTECT",
        PASSWORD => "PASSWORD",
        PROT4REV => "PROT4REV",
        PROT4REVPASS => "PROT4REVPASS",
        WINDOW1 => "WINDOW1",
        BACKUP => "BACKUP",
        HIDEOBJ => "HIDEOBJ",
        DATEMODE => "DATEMODE",
        PRECISION => "PRECISION",
        REFRESHALL => "REFRESHALL",
        BOOKBOOL => "BOOKBOOL",
        FONT => "FONT",
        FORMAT => "FORMAT",
        XF => "XF",
        STYLE => "STYLE",
        USESELFS => "USESELFS",
        BOUNDSHEET => "BOUNDSHEET",
        COUNTRY => "COUNTRY",
        RECALCID => "RECALCID",
        SST => "SST",
        EXTSST => "EXTSST",
        PALETTE => "PALETTE",
        FILESHARING => "FILESHARING",
        WRITEPROT => "WRITEPROT",
        MSODRAWINGGROUP => "MSODRAWINGGROUP",
        HLINK => "HLINK",
        BOOKEXT => "BOOKEXT",
        SUPBOOK => "SUPBOOK",
        EXTERNNAME => "EXTERNNAME",
        XCT => "XCT",
        CRN => "CRN",
        EXTERNSHEET => "EXTERNSHEET",
        NAME => "NAME",
        NAMECMT => "NAMECMT",
        INDEX => "INDEX",
        UNCALCED => "UNCALCED",
        CALCMODE => "CALCMODE",
        CALCCOUNT => "CALCCOUNT",
        REFMODE => "REFMODE",
        ITERATION => "ITERATION",
        DELTA => "DELTA",
        SAVERECALC => "SAVERECALC",
        PRINTHEADERS => "PRINTHEADERS",
        PRINTGRIDLINES => "PRINTGRIDLINES",
        GRIDSET => "GRIDSET",
        GUTS => "GUTS",
        DEFAULTROWHEIGHT => "DEFAULTROWHEIGHT",
        WSBOOL => "WSBOOL",
        SHEETEXT => "SHEETEXT",
        HORIZONTALPAGEBREAKS => "HORIZONTALPAGEBREAKS",
        VERTICALPAGEBREAKS => "VERTICALPAGEBREAKS",
        HEADER => "HEADER",
        FOOTER => "FOOTER",
        HCENTER => "HCENTER",
        VCENTER => "VCENTER",
        LEFTMARGIN => "LEFTMARGIN",
        RIGHTMARGIN => "RIGHTMARGIN",
        TOPMARGIN => "TOPMARGIN",
        BOTTOMMARGIN => "BOTTOMMARGIN",
        PLS => "PLS",
        SETUP => "SETUP",
        BITMAP => "BITMAP",
        PRINTSIZE => "PRINTSIZE",
        HEADERFOOTER => "HEADERFOOTER",
        OBJPROTECT => "OBJPROTECT",
        SCENPROTECT => "SCENPROTECT",
        FEATHDR => "FEATHDR",
        FEAT => "FEAT",
        DEFCOLWIDTH => "DEFCOLWIDTH",
        COLINFO => "COLINFO",
        STANDARDWIDTH => "STANDARDWIDTH",
        DIMENSION => "DIMENSION",
        ROW => "ROW",
        DBCELL => "DBCELL",
        WINDOW2 => "WINDOW2",
        SCL => "SCL",
        PANE => "PANE",
        SELECTION => "SELECTION",
        MERGECELLS => "MERGECELLS",
        LABELRANGES => "LABELRANGES",
        PHONETICPR => "PHONETICPR",
        CODENAME => "CODENAME",
        USERSVIEWBEGIN => "USERSVIEWBEGIN",
        USERSVIEWEND => "USERSVIEWEND",
        SORT => "SORT",
        AUTOFILTERINFO => "AUTOFILTERINFO",
        AUTOFILTER => "AUTOFILTER",
        FILTERMODE => "FILTERMODE",
        DCONREF => "DCONREF",
        SXVIEW => "SXVIEW",
        CHARTFRTINFO => "CHARTFRTINFO",
        PLV => "PLV",
        DXF => "DXF",
        CFHEADER => "CFHEADER",
        CFRULE => "CFRULE",
        CFHEADER12 => "CFHEADER12",
        CFRULE12 => "CFRULE12",
        DVAL => "DVAL",
        DV => "DV",
        MSODRAWING => "MSODRAWING",
        MSODRAWINGSELECTION => "MSODRAWINGSELECTION",
        OBJ => "OBJ",
        TXO => "TXO",
        NOTE => "NOTE",
        LABELSST => "LABELSST",
        LABEL => "LABEL",
        NUMBER => "NUMBER",
        RK => "RK",
        MULRK => "MULRK",
        BLANK => "BLANK",
        MULBLANK => "MULBLANK",
        BOOLERR => "BOOLERR",
        FORMULA => "FORMULA",
        STRING => "STRING",
        RSTRING => "RSTRING",
        ARRAY => "ARRAY",
        SHRFMLA => "SHRFMLA",
        TABLE => "TABLE",
        _ => "UNKNOWN",
    }
}
