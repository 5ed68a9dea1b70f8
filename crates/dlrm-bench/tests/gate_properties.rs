//! Property-based tests for the compatibility gate and padding arithmetic.

use dlrm_bench::config::ceil_div;
use dlrm_bench::gate::{check_device, check_lds, check_sizes};
use dlrm_bench::{Architecture, DataType, Direction, ProblemConfig, ProblemParams};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────────

fn arb_data_type() -> impl Strategy<Value = DataType> {
    prop::sample::select(DataType::ALL.to_vec())
}

fn arb_tile() -> impl Strategy<Value = u32> {
    prop_oneof![Just(16u32), Just(32u32)]
}

fn arb_arch() -> impl Strategy<Value = Architecture> {
    prop::sample::select(vec![
        Architecture::Unsupported,
        Architecture::Gfx908,
        Architecture::Gfx90a,
        Architecture::Gfx940,
        Architecture::Gfx941,
        Architecture::Gfx942,
        Architecture::Gfx1100,
        Architecture::Gfx1101,
        Architecture::Gfx1102,
    ])
}

fn config(tile: u32, block_x: u32, m: u32, k: u32, b: u32) -> ProblemConfig {
    ProblemConfig::new(&ProblemParams {
        tile_size: tile,
        data_type: DataType::F16,
        thread_block: (block_x, 1),
        problem_size: (m, k, b),
        direction: Direction::Forward,
    })
    .unwrap()
}

// ── Property tests ───────────────────────────────────────────────────────────

proptest! {
    /// Padded extents are the smallest tile multiples at or above the size.
    #[test]
    fn padding_rounds_up_to_tile(tile in arb_tile(), m in 1u32..2048, k in 1u32..2048) {
        let cfg = config(tile, 64, m, k, 1);
        prop_assert_eq!(cfg.m_padded() % tile, 0);
        prop_assert!(cfg.m_padded() >= m && cfg.m_padded() - m < tile);
        prop_assert_eq!(cfg.k_padded() % tile, 0);
        prop_assert!(cfg.k_padded() >= k && cfg.k_padded() - k < tile);
        prop_assert_eq!(cfg.m_padded(), ceil_div(m, tile) * tile);
    }

    /// Padding an already padded size changes nothing.
    #[test]
    fn padding_is_idempotent(tile in arb_tile(), m in 1u32..2048, k in 1u32..2048) {
        let once = config(tile, 64, m, k, 1);
        let twice = config(tile, 64, once.m_padded(), once.k_padded(), 1);
        prop_assert_eq!(twice.m_padded(), once.m_padded());
        prop_assert_eq!(twice.k_padded(), once.k_padded());
        prop_assert!(twice.is_aligned());
    }

    /// Any dimension that is not a tile multiple is rejected.
    #[test]
    fn unaligned_sizes_rejected(tile in arb_tile(), m in 1u32..1024, k in 1u32..1024) {
        let cfg = config(tile, 64, m, k, 1);
        prop_assume!(m % tile != 0 || k % tile != 0);
        prop_assert!(!check_sizes(&cfg));
    }

    /// Dimensions below one tile are rejected.
    #[test]
    fn sub_tile_sizes_rejected(tile in arb_tile(), m in 0u32..16, k in 16u32..512) {
        prop_assert!(!check_sizes(&config(tile, 64, m, k * tile, 1)));
        prop_assert!(!check_sizes(&config(tile, 64, k * tile, m, 1)));
    }

    /// Aligned sizes with a tile-multiple block pass the size check.
    #[test]
    fn aligned_sizes_accepted(
        tile in arb_tile(),
        mt in 1u32..32,
        kt in 1u32..32,
        bt in 1u32..16,
        b in 1u32..8,
    ) {
        let cfg = config(tile, bt * tile, mt * tile, kt * tile, b);
        prop_assert!(check_sizes(&cfg));
        prop_assert!(cfg.is_aligned());
    }

    /// A block width that is not a tile multiple is rejected.
    #[test]
    fn unaligned_block_rejected(tile in arb_tile(), block_x in 1u32..512) {
        prop_assume!(block_x % tile != 0);
        prop_assert!(!check_sizes(&config(tile, block_x, 4 * tile, 4 * tile, 1)));
    }

    /// The gfx11 family runs only 16-bit float, bf16 and i8 with 16×16 tiles.
    #[test]
    fn gfx11_rules(dt in arb_data_type(), tile in arb_tile()) {
        let allowed = matches!(dt, DataType::F16 | DataType::H16 | DataType::BF16 | DataType::I8)
            && tile == 16;
        for arch in [Architecture::Gfx1100, Architecture::Gfx1101, Architecture::Gfx1102] {
            prop_assert_eq!(check_device(arch, dt, tile), allowed);
        }
    }

    /// Outside gfx11, only unsupported devices and gfx908 with f64 fail.
    #[test]
    fn device_rules(arch in arb_arch(), dt in arb_data_type(), tile in arb_tile()) {
        prop_assume!(!arch.is_gfx11());
        let expected = arch != Architecture::Unsupported
            && !(arch == Architecture::Gfx908 && dt == DataType::F64);
        prop_assert_eq!(check_device(arch, dt, tile), expected);
    }

    /// LDS fits iff the requirement does not exceed capacity.
    #[test]
    fn lds_rule(required in 0u32..1 << 20, capacity in 0u32..1 << 20) {
        prop_assert_eq!(check_lds(required, capacity), required <= capacity);
    }
}
