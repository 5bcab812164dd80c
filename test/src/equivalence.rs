//! The cores are interchangeable: for the same route set, DIR-24-8 and
//! Stride-8 agree on every IPv4 address, and Wide-16 and Stride-8 agree on
//! every IPv6 address.

use lpm::Table;

use crate::data;

#[test]
fn v4_cores_agree() -> Result<(), anyhow::Error> {
    let routes = data::v4_routes(47, 600);
    let probes = data::v4_probes(&routes, 48, 1000);

    let mut dir24 = Table::ipv4_dir24();
    let mut stride8 = Table::ipv4_stride8();
    for (p, nh) in &routes {
        dir24.insert(*p, *nh)?;
        stride8.insert(*p, *nh)?;
    }

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

#[test]
fn v6_cores_agree() -> Result<(), anyhow::Error> {
    let routes = data::v6_routes(74, 400);
    let probes = data::v6_probes(&routes, 75, 600);

    let mut wide16 = Table::ipv6_wide16();
    let mut stride8 = Table::ipv6_stride8();
    for (p, nh) in &routes {
        wide16.insert(*p, *nh)?;
        stride8.insert(*p, *nh)?;
    }

    for a in probes {
        assert_eq!(
            wide16.lookup_ipv6(&a),
            stride8.lookup_ipv6(&a),
            "cores disagree at {}",
            std::net::Ipv6Addr::from(a)
        );
    }
    Ok(())
}

#[test]
fn v4_cores_agree_after_deletes() -> Result<(), anyhow::Error> {
    let routes = data::v4_routes(99, 500);

    let mut dir24 = Table::ipv4_dir24();
    let mut stride8 = Table::ipv4_stride8();
    for (p, nh) in &routes {
        dir24.insert(*p, *nh)?;
        stride8.insert(*p, *nh)?;
    }
    // drop every third route; the two cores share delete semantics exactly
    for (p, _) in routes.iter().step_by(3) {
        dir24.remove(*p)?;
        stride8.remove(*p)?;
    }

    let probes = data::v4_probes(&routes, 100, 1000);
    for a in probes {
        assert_eq!(
            dir24.lookup_ipv4(a),
            stride8.lookup_ipv4(a),
            "cores disagree at {}",
            std::net::Ipv4Addr::from(a)
        );
    }
    assert_eq!(dir24.prefix_count(), stride8.prefix_count());
    Ok(())
}

#[test]
fn v6_cores_agree_after_deletes() -> Result<(), anyhow::Error> {
    let routes = data::v6_routes(7474, 300);

    let mut wide16 = Table::ipv6_wide16();
    let mut stride8 = Table::ipv6_stride8();
    for (p, nh) in &routes {
        wide16.insert(*p, *nh)?;
        stride8.insert(*p, *nh)?;
    }
    for (p, _) in routes.iter().step_by(2) {
        wide16.remove(*p)?;
        stride8.remove(*p)?;
    }

    let probes = data::v6_probes(&routes, 7475, 600);
    for a in probes {
        assert_eq!(
            wide16.lookup_ipv6(&a),
            stride8.lookup_ipv6(&a),
            "cores disagree at {}",
            std::net::Ipv6Addr::from(a)
        );
    }
    assert_eq!(wide16.prefix_count(), stride8.prefix_count());
    Ok(())
}
