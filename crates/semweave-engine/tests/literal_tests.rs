//! Property tests for literal pushes

use proptest::prelude::*;
use semweave_bytecode::{Constant, Opcode, Operand};
use semweave_engine::{is_load_int32, push_constant, push_int32};

proptest! {
    #[test]
    fn push_int32_is_always_classified(value in any::<i32>()) {
        let instr = push_int32(value);
        prop_assert!(is_load_int32(&instr));
        if (0..=8).contains(&value) {
            prop_assert_eq!(instr.operand, Operand::None);
        } else {
            prop_assert_eq!(instr.opcode, Opcode::LdcI4S);
            prop_assert_eq!(instr.operand, Operand::Int32(value));
        }
    }

    #[test]
    fn small_i64_defaults_widen_from_int32(value in any::<i32>()) {
        let pushed = push_constant(&Constant::I64(i64::from(value))).unwrap();
        prop_assert_eq!(pushed.len(), 2);
        prop_assert!(is_load_int32(&pushed[0]));
        prop_assert_eq!(pushed[1].opcode, Opcode::ConvI8);
    }

    #[test]
    fn large_i64_defaults_use_long_literal(value in any::<i64>()) {
        prop_assume!(i32::try_from(value).is_err());
        let pushed = push_constant(&Constant::I64(value)).unwrap();
        prop_assert_eq!(pushed.len(), 1);
        prop_assert_eq!(&pushed[0].operand, &Operand::Int64(value));
    }

    #[test]
    fn u32_defaults_are_reinterpreted(value in any::<u32>()) {
        let pushed = push_constant(&Constant::U32(value)).unwrap();
        prop_assert_eq!(pushed, vec![push_int32(value as i32)]);
    }
}
