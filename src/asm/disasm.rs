//! Disassembler for byte programs.
//!
//! Converts raw program bytes back to readable assembly.

use crate::cpu::decode::{assemble_address, lookup, Operand};

/// Disassemble the instruction at the start of `bytes`.
///
/// Returns the text and the number of bytes consumed. Operand bytes
/// missing at the end of the slice are shown as `??`.
pub fn disassemble_instruction(bytes: &[u8]) -> (String, usize) {
    let Some(&byte) = bytes.first() else {
        return (String::new(), 0);
    };

    let Some(info) = lookup(byte) else {
        return (format!("??? ; {:02X}", byte), 1);
    };

    let operand_len = info.operand.len();
    let available = bytes.len().saturating_sub(1).min(operand_len);
    let operands = &bytes[1..1 + available];

    let text = match (info.operand, operands) {
        (Operand::None, _) => info.mnemonic.to_string(),
        (Operand::Immediate, [value]) => format!("{} #${:02X}", info.mnemonic, value),
        (Operand::Absolute, [low, high]) => {
            format!("{} ${:04X}", info.mnemonic, assemble_address(*low, *high))
        }
        _ => format!("{} ??", info.mnemonic),
    };

    (text, 1 + available)
}

/// Disassemble a whole program.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; Disassembly\n");
    output.push_str("; -----------\n\n");

    let mut offset = 0;
    while offset < bytes.len() {
        let (text, len) = disassemble_instruction(&bytes[offset..]);
        let raw = bytes[offset..offset + len]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        output.push_str(&format!("{:04X}: {:<9} {}\n", offset, raw, text));
        offset += len;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_forms() {
        assert_eq!(disassemble_instruction(&[0xA9, 0x05]), ("LDA #$05".to_string(), 2));
        assert_eq!(disassemble_instruction(&[0x8D, 0x10, 0x00]), ("STA $0010".to_string(), 3));
        assert_eq!(disassemble_instruction(&[0x00]), ("BRK".to_string(), 1));
        assert_eq!(disassemble_instruction(&[0x13]), ("??? ; 13".to_string(), 1));
    }

    #[test]
    fn test_address_uses_machine_weight() {
        // high byte is weighted by 0xFF
        assert_eq!(disassemble_instruction(&[0xAD, 0x01, 0x01]).0, "LDA $0100");
    }

    #[test]
    fn test_truncated_operand() {
        assert_eq!(disassemble_instruction(&[0xEE, 0x10]), ("INC ??".to_string(), 2));
    }

    #[test]
    fn test_disassemble_listing() {
        let listing = disassemble(&[0xA9, 0x02, 0x8D, 0x10, 0x00, 0x00]);
        let lines: Vec<&str> = listing.lines().skip(3).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("0000: A9 02"));
        assert!(lines[0].ends_with("LDA #$02"));
        assert!(lines[1].starts_with("0002: 8D 10 00"));
        assert!(lines[2].ends_with("BRK"));
    }
}
