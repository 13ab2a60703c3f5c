//! Page labels (ISO 32000-1:2008, Section 12.4.2).
//!
//! Page labels let a document number its sections differently, e.g.
//! lowercase Roman numerals for the preface, Arabic numerals for the body
//! and `A-1`, `A-2` for appendices. Each [`PageLabel`] starts a range at a
//! page index; the range runs until the next label. The catalog's
//! `PageLabels` number tree is kept as a single sorted `Nums` array.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::error::Result;
use crate::object::{Object, PdfArray, PdfDictionary};
use crate::ownership::{admit, owned_via_transfer, Owned, Transfer, TransferPass, WrapperCore};
use crate::session::{remember_wrapper, wrapper_for, Owner};

/// Page numbering style as defined in PDF specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLabelStyle {
    /// Decimal Arabic numerals (1, 2, 3, ...)
    Decimal,
    /// Uppercase Roman numerals (I, II, III, IV, ...)
    RomanUpper,
    /// Lowercase Roman numerals (i, ii, iii, iv, ...)
    RomanLower,
    /// Uppercase letters (A, B, C, ... Z, AA, BB, ...)
    AlphaUpper,
    /// Lowercase letters (a, b, c, ... z, aa, bb, ...)
    AlphaLower,
    /// No numbering style (only prefix is used, if any)
    None,
}

impl PageLabelStyle {
    /// Convert from PDF name value to PageLabelStyle.
    fn from_name(name: &str) -> Self {
        match name {
            "D" => PageLabelStyle::Decimal,
            "R" => PageLabelStyle::RomanUpper,
            "r" => PageLabelStyle::RomanLower,
            "A" => PageLabelStyle::AlphaUpper,
            "a" => PageLabelStyle::AlphaLower,
            _ => PageLabelStyle::None,
        }
    }

    /// Convert to PDF name value.
    pub fn to_name(&self) -> Option<&'static str> {
        match self {
            PageLabelStyle::Decimal => Some("D"),
            PageLabelStyle::RomanUpper => Some("R"),
            PageLabelStyle::RomanLower => Some("r"),
            PageLabelStyle::AlphaUpper => Some("A"),
            PageLabelStyle::AlphaLower => Some("a"),
            PageLabelStyle::None => None,
        }
    }

    /// Numeric portion of a label in this style.
    pub fn format_number(&self, number: u32) -> String {
        match self {
            PageLabelStyle::Decimal => number.to_string(),
            PageLabelStyle::RomanUpper => to_roman(number, true),
            PageLabelStyle::RomanLower => to_roman(number, false),
            PageLabelStyle::AlphaUpper => to_alpha(number, true),
            PageLabelStyle::AlphaLower => to_alpha(number, false),
            PageLabelStyle::None => String::new(),
        }
    }
}

/// A page label dictionary: style, prefix and first number of a range.
#[derive(Clone)]
pub struct PageLabel(Rc<PageLabelInner>);

struct PageLabelInner {
    core: Rc<WrapperCore>,
}

impl PageLabel {
    /// New unowned label with the given style, starting at 1.
    pub fn new(style: PageLabelStyle) -> Self {
        let dict = PdfDictionary::with_type("PageLabel");
        let label = Self::from_core(WrapperCore::new(dict, None));
        label.set_style(style);
        label
    }

    pub(crate) fn from_core(core: Rc<WrapperCore>) -> Self {
        PageLabel(Rc::new(PageLabelInner { core }))
    }

    pub(crate) fn wrap(dict: PdfDictionary, owner: Option<Owner>) -> Self {
        wrapper_for(&dict, owner.as_ref(), || {
            Self::from_core(WrapperCore::new(dict.clone(), owner.clone()))
        })
    }

    fn dict(&self) -> &PdfDictionary {
        self.0.core.dict()
    }

    /// Set the prefix string.
    pub fn with_prefix(self, prefix: &str) -> Self {
        self.set_prefix(Some(prefix));
        self
    }

    /// Set the starting value for page numbering.
    pub fn with_start_value(self, start: u32) -> Self {
        self.set_start_value(start);
        self
    }

    /// Numbering style (`S`); no style when absent.
    pub fn style(&self) -> PageLabelStyle {
        self.dict()
            .get_name("S")
            .map(|s| PageLabelStyle::from_name(&s))
            .unwrap_or(PageLabelStyle::None)
    }

    /// Set the numbering style.
    pub fn set_style(&self, style: PageLabelStyle) {
        match style.to_name() {
            Some(name) => self.dict().insert("S", Object::name(name)),
            None => self.dict().remove("S"),
        };
    }

    /// Label prefix (`P`).
    pub fn prefix(&self) -> Option<String> {
        self.dict().get_text("P")
    }

    /// Set or clear the prefix.
    pub fn set_prefix(&self, prefix: Option<&str>) {
        match prefix {
            Some(p) => self.dict().insert("P", Object::text(p)),
            None => self.dict().remove("P"),
        };
    }

    /// Number of the first page in the range (`St`, default 1).
    pub fn start_value(&self) -> u32 {
        match self.dict().get_integer("St") {
            Some(st) if st > 0 => u32::try_from(st).unwrap_or(u32::MAX),
            _ => 1,
        }
    }

    /// Set the first number. 1 removes `St`.
    pub fn set_start_value(&self, start: u32) {
        if start <= 1 {
            self.dict().remove("St");
        } else {
            self.dict().insert("St", start);
        }
    }

    /// Label of the page `offset` pages into the range.
    pub fn format(&self, offset: usize) -> String {
        let offset = u32::try_from(offset).unwrap_or(u32::MAX);
        let number = self.start_value().saturating_add(offset);
        let digits = self.style().format_number(number);
        match self.prefix() {
            Some(prefix) => format!("{}{}", prefix, digits),
            None => digits,
        }
    }

    /// True if both handles refer to the same wrapper.
    pub fn ptr_eq(&self, other: &PageLabel) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Transfer for PageLabel {
    fn core(&self) -> &Rc<WrapperCore> {
        &self.0.core
    }

    fn attach_in(&self, owner: &Owner, pass: &mut TransferPass) -> Result<()> {
        self.0.core.claim(owner)?;
        pass.mark_attached(self.dict().key());
        remember_wrapper(owner, self.dict(), self);
        Ok(())
    }

    fn copy_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self {
        let copy = Self::from_core(WrapperCore::new(PdfDictionary::new(), Some(owner.clone())));
        pass.remember_copy(self.dict().key(), &copy);
        pass.copier
            .copy_keys(self.dict(), copy.dict(), &["Type", "S", "P", "St"]);
        remember_wrapper(owner, copy.dict(), &copy);
        copy
    }
}

owned_via_transfer!(PageLabel);

impl std::fmt::Debug for PageLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLabel")
            .field("style", &self.style())
            .field("prefix", &self.prefix())
            .field("start", &self.start_value())
            .finish()
    }
}

/// Page label ranges keyed by their first page index.
#[derive(Clone)]
pub struct PageLabelCollection(Rc<LabelState>);

struct LabelState {
    host: Rc<WrapperCore>,
    ranges: RefCell<Vec<(usize, PageLabel)>>,
}

impl PageLabelCollection {
    /// Ranges of the number tree on `host`. A tree split into `Kids` is
    /// rewritten as a single `Nums` array.
    pub(crate) fn load(host: Rc<WrapperCore>) -> Self {
        let owner = host.owner();
        let mut ranges = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![host.dict().clone()];
        let mut nested = false;
        while let Some(node) = stack.pop() {
            if !seen.insert(node.key()) {
                continue;
            }
            let nums = node.get_array_or_empty("Nums").to_vec();
            for pair in nums.chunks_exact(2) {
                let (Some(index), Some(label)) = (pair[0].as_integer(), pair[1].as_dict()) else {
                    continue;
                };
                if index >= 0 {
                    ranges.push((index as usize, PageLabel::wrap(label.clone(), owner.clone())));
                }
            }
            for kid in node.get_array_or_empty("Kids").to_vec() {
                if let Object::Dictionary(kid) = kid {
                    nested = true;
                    stack.push(kid);
                }
            }
        }
        ranges.sort_by_key(|(index, _)| *index);
        ranges.dedup_by_key(|(index, _)| *index);

        let collection = PageLabelCollection(Rc::new(LabelState {
            host,
            ranges: RefCell::new(ranges),
        }));
        if nested {
            log::debug!("Flattening page label number tree");
            collection.write();
        }
        collection
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.0.ranges.borrow().len()
    }

    /// True if no range is defined.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label starting exactly at `page_index`.
    pub fn get(&self, page_index: usize) -> Option<PageLabel> {
        let ranges = self.0.ranges.borrow();
        let pos = ranges.binary_search_by_key(&page_index, |(i, _)| *i).ok()?;
        Some(ranges[pos].1.clone())
    }

    /// Start a range at `page_index`, replacing one that started there.
    /// Returns the label actually stored.
    pub fn set(&self, page_index: usize, label: &PageLabel) -> PageLabel {
        let stored = admit(&self.0.host, label);
        {
            let mut ranges = self.0.ranges.borrow_mut();
            match ranges.binary_search_by_key(&page_index, |(i, _)| *i) {
                Ok(pos) => ranges[pos].1 = stored.clone(),
                Err(pos) => ranges.insert(pos, (page_index, stored.clone())),
            }
        }
        self.write();
        stored
    }

    /// Remove the range starting at `page_index`.
    pub fn remove(&self, page_index: usize) -> Option<PageLabel> {
        let removed = {
            let mut ranges = self.0.ranges.borrow_mut();
            let pos = ranges.binary_search_by_key(&page_index, |(i, _)| *i).ok()?;
            ranges.remove(pos).1
        };
        self.write();
        Some(removed)
    }

    /// All ranges as `(first page index, label)`, sorted.
    pub fn ranges(&self) -> Vec<(usize, PageLabel)> {
        self.0.ranges.borrow().clone()
    }

    /// Label text for `page_index`: the last range starting at or before
    /// it decides; pages before every range get their 1-based number.
    pub fn label_for(&self, page_index: usize) -> String {
        let ranges = self.0.ranges.borrow();
        match ranges.iter().rev().find(|(start, _)| *start <= page_index) {
            Some((start, label)) => label.format(page_index - start),
            None => (page_index + 1).to_string(),
        }
    }

    fn write(&self) {
        let host = self.0.host.dict();
        let nums = PdfArray::new();
        for (index, label) in self.0.ranges.borrow().iter() {
            nums.push(*index);
            nums.push(label.underlying());
        }
        host.remove("Kids");
        host.insert("Nums", nums);
    }
}

/// Largest number written as Roman numerals; larger ones are decimal.
const MAX_ROMAN: u32 = 4999;

/// Largest number written as letters (`ZZZ...` of 100 letters).
const MAX_ALPHA: u32 = 26 * 100;

/// Convert a number to Roman numerals.
fn to_roman(mut n: u32, uppercase: bool) -> String {
    if n == 0 {
        return String::new();
    }
    if n > MAX_ROMAN {
        return n.to_string();
    }

    let numerals = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];

    let mut result = String::new();

    for (value, numeral) in numerals.iter() {
        while n >= *value {
            result.push_str(numeral);
            n -= value;
        }
    }

    if uppercase {
        result.to_uppercase()
    } else {
        result
    }
}

/// Letters as page labels count them: A..Z, then AA..ZZ, then AAA..
fn to_alpha(n: u32, uppercase: bool) -> String {
    if n == 0 {
        return String::new();
    }
    if n > MAX_ALPHA {
        return n.to_string();
    }
    let base = if uppercase { b'A' } else { b'a' };
    let letter = (base + ((n - 1) % 26) as u8) as char;
    let repeat = ((n - 1) / 26 + 1) as usize;
    std::iter::repeat(letter).take(repeat).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> (Rc<WrapperCore>, PageLabelCollection) {
        let host = WrapperCore::new(PdfDictionary::new(), None);
        let labels = PageLabelCollection::load(host.clone());
        (host, labels)
    }

    #[test]
    fn test_to_roman() {
        assert_eq!(to_roman(1, false), "i");
        assert_eq!(to_roman(4, true), "IV");
        assert_eq!(to_roman(1994, true), "MCMXCIV");
    }

    #[test]
    fn test_to_alpha_repeats_letters() {
        assert_eq!(to_alpha(1, true), "A");
        assert_eq!(to_alpha(26, false), "z");
        assert_eq!(to_alpha(27, true), "AA");
        assert_eq!(to_alpha(28, true), "BB");
        assert_eq!(to_alpha(53, false), "aaa");
    }

    #[test]
    fn test_large_numbers_fall_back_to_decimal() {
        assert_eq!(to_roman(4999, true), "MMMMCMXCIX");
        assert_eq!(to_roman(5000, true), "5000");
        assert_eq!(to_alpha(2600, true), "Z".repeat(100));
        assert_eq!(to_alpha(2601, false), "2601");
        assert_eq!(to_alpha(u32::MAX, false), u32::MAX.to_string());
    }

    #[test]
    fn test_out_of_range_start_is_clamped() {
        let label = PageLabel::new(PageLabelStyle::AlphaUpper);
        label.dict().insert("St", 1_i64 << 33);
        assert_eq!(label.start_value(), u32::MAX);
        assert_eq!(label.format(5), u32::MAX.to_string());

        label.dict().insert("St", -4);
        assert_eq!(label.start_value(), 1);
        assert_eq!(label.format(0), "A");
    }

    #[test]
    fn test_label_for_ranges() {
        let (host, labels) = collection();
        labels.set(0, &PageLabel::new(PageLabelStyle::RomanLower));
        labels.set(4, &PageLabel::new(PageLabelStyle::Decimal));
        labels.set(10, &PageLabel::new(PageLabelStyle::Decimal).with_prefix("A-"));

        assert_eq!(labels.label_for(0), "i");
        assert_eq!(labels.label_for(3), "iv");
        assert_eq!(labels.label_for(4), "1");
        assert_eq!(labels.label_for(11), "A-2");

        let nums = host.dict().get_array("Nums").unwrap();
        assert_eq!(nums.len(), 6);
        assert_eq!(nums.get(2), Some(Object::Integer(4)));
    }

    #[test]
    fn test_set_keeps_nums_sorted_and_replaces() {
        let (host, labels) = collection();
        labels.set(5, &PageLabel::new(PageLabelStyle::Decimal));
        labels.set(1, &PageLabel::new(PageLabelStyle::AlphaUpper));
        labels.set(5, &PageLabel::new(PageLabelStyle::RomanUpper).with_start_value(3));
        assert_eq!(labels.len(), 2);
        let nums = host.dict().get_array("Nums").unwrap();
        assert_eq!(nums.get(0), Some(Object::Integer(1)));
        assert_eq!(nums.get(2), Some(Object::Integer(5)));
        assert_eq!(labels.label_for(6), "IV");
        assert!(labels.remove(1).is_some());
        assert!(labels.remove(1).is_none());
        assert_eq!(labels.label_for(0), "1");
    }

    #[test]
    fn test_nested_tree_is_flattened() {
        let leaf_a = PdfDictionary::new().with(
            "Nums",
            PdfArray::from_vec(vec![
                Object::Integer(0),
                Object::from(PdfDictionary::new().with("S", Object::name("r"))),
            ]),
        );
        let leaf_b = PdfDictionary::new().with(
            "Nums",
            PdfArray::from_vec(vec![
                Object::Integer(3),
                Object::from(PdfDictionary::new().with("S", Object::name("D"))),
            ]),
        );
        let root = PdfDictionary::new().with(
            "Kids",
            PdfArray::from_vec(vec![Object::from(leaf_a), Object::from(leaf_b)]),
        );
        let labels = PageLabelCollection::load(WrapperCore::new(root.clone(), None));
        assert_eq!(labels.len(), 2);
        assert!(!root.contains_key("Kids"));
        assert_eq!(root.get_array("Nums").unwrap().len(), 4);
        assert_eq!(labels.label_for(4), "2");
    }

    #[test]
    fn test_copy_keeps_label_keys() {
        let a = Owner::detached();
        let label = PageLabel::new(PageLabelStyle::Decimal).with_prefix("p");
        label.underlying().insert("Extra", 1);
        label.attach(&a).unwrap();
        let copy = label.clone_to(&Owner::detached());
        assert!(!copy.ptr_eq(&label));
        assert_eq!(copy.prefix().as_deref(), Some("p"));
        assert!(!copy.underlying().contains_key("Extra"));
        assert_eq!(copy.underlying().get_name("Type").as_deref(), Some("PageLabel"));
    }
}
