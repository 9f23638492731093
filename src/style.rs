//! Toggle-attribute bit-set and delta emission.
//!
//! Property decoders build the complete attribute set described by a
//! property string, then report only the bits that differ from the set they
//! reported last.

use bitflags::bitflags;

use crate::listener::{Attribute, Event};

bitflags! {
    /// Character attributes that are switched on and off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttributeSet: u16 {
        const BOLD = 0x0001;
        const ITALIC = 0x0002;
        const UNDERLINE = 0x0004;
        const STRIKEOUT = 0x0008;
        const SUBSCRIPT = 0x0010;
        const SUPERSCRIPT = 0x0020;
        const OUTLINE = 0x0040;
        const SHADOW = 0x0080;
        const SMALL_CAPS = 0x0100;
        const ALL_CAPS = 0x0200;
        const EMBOSS = 0x0400;
        const ENGRAVE = 0x0800;
    }
}

/// Reporting order of attribute changes.
const ORDER: [(AttributeSet, Attribute); 12] = [
    (AttributeSet::BOLD, Attribute::Bold),
    (AttributeSet::ITALIC, Attribute::Italic),
    (AttributeSet::UNDERLINE, Attribute::Underline),
    (AttributeSet::STRIKEOUT, Attribute::Strikeout),
    (AttributeSet::SUBSCRIPT, Attribute::Subscript),
    (AttributeSet::SUPERSCRIPT, Attribute::Superscript),
    (AttributeSet::OUTLINE, Attribute::Outline),
    (AttributeSet::SHADOW, Attribute::Shadow),
    (AttributeSet::SMALL_CAPS, Attribute::SmallCaps),
    (AttributeSet::ALL_CAPS, Attribute::AllCaps),
    (AttributeSet::EMBOSS, Attribute::Emboss),
    (AttributeSet::ENGRAVE, Attribute::Engrave),
];

impl From<Attribute> for AttributeSet {
    fn from(attr: Attribute) -> Self {
        ORDER
            .iter()
            .find(|(_, a)| *a == attr)
            .map_or(Self::empty(), |(bit, _)| *bit)
    }
}

/// Append one `AttributeChange` per bit that differs between `previous`
/// and `next`, and return `next` as the new tracked state.
pub(crate) fn emit_delta(previous: AttributeSet, next: AttributeSet, out: &mut Vec<Event>) -> AttributeSet {
    let changed = previous ^ next;
    for (bit, attr) in ORDER {
        if changed.contains(bit) {
            out.push(Event::AttributeChange(next.contains(bit), attr));
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_change_no_events() {
        let mut out = Vec::new();
        let set = AttributeSet::BOLD | AttributeSet::ITALIC;
        assert_eq!(emit_delta(set, set, &mut out), set);
        assert!(out.is_empty());
    }

    #[test]
    fn reports_on_and_off() {
        let mut out = Vec::new();
        let next = emit_delta(
            AttributeSet::BOLD,
            AttributeSet::ITALIC | AttributeSet::ENGRAVE,
            &mut out,
        );
        assert_eq!(next, AttributeSet::ITALIC | AttributeSet::ENGRAVE);
        assert_eq!(
            out,
            vec![
                Event::AttributeChange(false, Attribute::Bold),
                Event::AttributeChange(true, Attribute::Italic),
                Event::AttributeChange(true, Attribute::Engrave),
            ]
        );
    }

    #[test]
    fn alternating_bold_flips_once_each() {
        let mut out = Vec::new();
        let mut state = AttributeSet::empty();
        let sequence = [true, false, false, true, true, false];
        for &bold in &sequence {
            let mut next = AttributeSet::UNDERLINE;
            next.set(AttributeSet::BOLD, bold);
            state = emit_delta(state, next, &mut out);
        }
        let bold_events = out
            .iter()
            .filter(|e| matches!(e, Event::AttributeChange(_, Attribute::Bold)))
            .count();
        // flips: off->on, on->off, off->on, on->off
        assert_eq!(bold_events, 4);
        let underline_events = out.len() - bold_events;
        assert_eq!(underline_events, 1);
        assert_eq!(state, AttributeSet::UNDERLINE);
    }

    #[test]
    fn attribute_to_bit() {
        assert_eq!(AttributeSet::from(Attribute::SmallCaps), AttributeSet::SMALL_CAPS);
    }
}
