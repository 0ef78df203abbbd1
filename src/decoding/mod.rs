pub mod hex;

pub use hex::{
    decode_fixed_point, decode_opt_int, decode_opt_u64, decode_timestamp,
    decode_u64, encode_int, FixedPoint, HexError, WEI_DECIMALS,
};
