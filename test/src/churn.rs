//! Insert/delete interleavings: counter consistency, idempotence, and
//! round-tripping a table back to empty.

use lpm::{Table, INVALID_NEXT_HOP};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data;

#[test]
fn counters_track_the_ledger() -> Result<(), anyhow::Error> {
    let routes = data::v4_routes(13, 300);
    let mut t = Table::ipv4_dir24();

    let mut installed = std::collections::HashSet::new();
    for (p, nh) in &routes {
        t.insert(*p, *nh)?;
        installed.insert(*p);
        assert_eq!(t.prefix_count(), installed.len());
    }
    for (p, _) in routes.iter().step_by(2) {
        t.remove(*p)?;
        installed.remove(p);
        assert_eq!(t.prefix_count(), installed.len());
    }
    Ok(())
}

#[test]
fn repeated_insert_converges() -> Result<(), anyhow::Error> {
    for table in [Table::ipv4_dir24 as fn() -> Table, Table::ipv4_stride8] {
        let mut t = table();
        for _ in 0..5 {
            t.insert("10.1.0.0/16".parse().unwrap(), 200)?;
        }
        assert_eq!(t.prefix_count(), 1);
        assert_eq!(t.lookup_ipv4(u32::from_be_bytes([10, 1, 2, 3])), 200);

        t.insert("10.1.0.0/16".parse().unwrap(), 201)?;
        assert_eq!(t.prefix_count(), 1);
        assert_eq!(t.lookup_ipv4(u32::from_be_bytes([10, 1, 2, 3])), 201);
    }
    Ok(())
}

#[test]
fn repeated_delete_is_idempotent() -> Result<(), anyhow::Error> {
    let mut t = Table::ipv6_wide16();
    t.insert("2001:db8::/32".parse().unwrap(), 100)?;
    for _ in 0..3 {
        t.remove("2001:db8::/32".parse().unwrap())?;
        assert_eq!(t.prefix_count(), 0);
    }
    // deleting something never inserted also succeeds
    t.remove("fd00::/8".parse().unwrap())?;
    assert_eq!(t.prefix_count(), 0);
    Ok(())
}

#[test]
fn insert_then_delete_round_trips_to_empty() -> Result<(), anyhow::Error> {
    let routes = data::v4_routes(31, 400);
    let probes = data::v4_probes(&routes, 32, 500);

    for table in [Table::ipv4_dir24 as fn() -> Table, Table::ipv4_stride8] {
        let mut t = table();
        for (p, nh) in &routes {
            t.insert(*p, *nh)?;
        }
        for (p, _) in &routes {
            t.remove(*p)?;
        }
        assert_eq!(t.prefix_count(), 0);
        for a in &probes {
            assert_eq!(t.lookup_ipv4(*a), INVALID_NEXT_HOP);
        }
    }
    Ok(())
}

#[test]
fn v6_round_trips_to_empty() -> Result<(), anyhow::Error> {
    let routes = data::v6_routes(37, 250);
    let probes = data::v6_probes(&routes, 38, 300);

    for table in [Table::ipv6_wide16 as fn() -> Table, Table::ipv6_stride8] {
        let mut t = table();
        for (p, nh) in &routes {
            t.insert(*p, *nh)?;
        }
        for (p, _) in &routes {
            t.remove(*p)?;
        }
        assert_eq!(t.prefix_count(), 0);
        for a in &probes {
            assert_eq!(t.lookup_ipv6(a), INVALID_NEXT_HOP);
        }
    }
    Ok(())
}

#[test]
fn random_interleaving_keeps_the_cores_in_step(
) -> Result<(), anyhow::Error> {
    let routes = data::v4_routes(53, 200);
    let mut rng = StdRng::seed_from_u64(54);

    let mut dir24 = Table::ipv4_dir24();
    let mut stride8 = Table::ipv4_stride8();
    for step in 0..2000 {
        let (p, nh) = routes[rng.random_range(0..routes.len())];
        if rng.random_range(0..3) == 0 {
            dir24.remove(p)?;
            stride8.remove(p)?;
        } else {
            dir24.insert(p, nh + step)?;
            stride8.insert(p, nh + step)?;
        }
        assert_eq!(dir24.prefix_count(), stride8.prefix_count());
    }

    let probes = data::v4_probes(&routes, 55, 800);
    for a in probes {
        assert_eq!(
            dir24.lookup_ipv4(a),
            stride8.lookup_ipv4(a),
            "cores disagree at {}",
            std::net::Ipv4Addr::from(a)
        );
    }
    Ok(())
}
