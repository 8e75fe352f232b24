//! Numeric detection covering every character with a Unicode numeric type.

/// Letters (general category `Lo`) whose Unicode `Numeric_Type` is `Numeric`,
/// mostly CJK numeral ideographs such as 三 and 萬. `char::is_numeric` only
/// covers the `Nd`, `Nl` and `No` categories and misses these. Sorted.
const NUMERIC_LETTERS: [char; 81] = [
    '\u{3405}', '\u{3483}', '\u{382A}', '\u{3B4D}', '\u{4E00}', '\u{4E03}',
    '\u{4E07}', '\u{4E09}', '\u{4E5D}', '\u{4E8C}', '\u{4E94}', '\u{4E96}',
    '\u{4EBF}', '\u{4EC0}', '\u{4EDF}', '\u{4EE8}', '\u{4F0D}', '\u{4F70}',
    '\u{5104}', '\u{5146}', '\u{5169}', '\u{516B}', '\u{516D}', '\u{5341}',
    '\u{5343}', '\u{5344}', '\u{5345}', '\u{534C}', '\u{53C1}', '\u{53C2}',
    '\u{53C3}', '\u{53C4}', '\u{56DB}', '\u{58F1}', '\u{58F9}', '\u{5E7A}',
    '\u{5EFE}', '\u{5EFF}', '\u{5F0C}', '\u{5F0D}', '\u{5F0E}', '\u{5F10}',
    '\u{62FE}', '\u{634C}', '\u{67D2}', '\u{6F06}', '\u{7396}', '\u{767E}',
    '\u{8086}', '\u{842C}', '\u{8CAE}', '\u{8CB3}', '\u{8D30}', '\u{9621}',
    '\u{9646}', '\u{964C}', '\u{9678}', '\u{96F6}', '\u{F96B}', '\u{F973}',
    '\u{F978}', '\u{F9B2}', '\u{F9D1}', '\u{F9D3}', '\u{F9FD}', '\u{20001}',
    '\u{20064}', '\u{200E2}', '\u{20121}', '\u{2092A}', '\u{20983}', '\u{2098C}',
    '\u{2099C}', '\u{20AEA}', '\u{20AFD}', '\u{20B19}', '\u{22390}', '\u{22998}',
    '\u{23B1B}', '\u{2626D}', '\u{2F890}',
];

fn is_numeric_char(c: char) -> bool {
    c.is_numeric() || NUMERIC_LETTERS.binary_search(&c).is_ok()
}

/// True for a non-empty string made only of numeric characters.
pub fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_numeric_char)
}
