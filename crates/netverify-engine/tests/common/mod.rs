#![allow(dead_code)]

use netverify_config::{Configuration, Interface, IpAccessList, Network, StaticRoute};

pub type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

pub fn router(name: &str, interfaces: &[(&str, &str)]) -> BoxResult<Configuration> {
    let mut conf = Configuration::new(name);
    for (iface, address) in interfaces {
        conf.interfaces
            .push(Interface::new(*iface).with_address(address.parse()?));
    }
    Ok(conf)
}

pub fn static_route(network: &str, iface: &str) -> BoxResult<StaticRoute> {
    Ok(StaticRoute {
        network: network.parse()?,
        next_hop_interface: Some(iface.to_string()),
        next_hop_ip: None,
        administrative_cost: 1,
    })
}

/// Attach an access list with no lines (deny everything) to the outgoing
/// side of `iface`.
pub fn block_outgoing(conf: &mut Configuration, iface: &str) {
    let name = format!("BLOCK-{iface}");
    conf.ip_access_lists.insert(
        name.clone(),
        IpAccessList {
            name: name.clone(),
            lines: Vec::new(),
        },
    );
    if let Some(i) = conf.interfaces.iter_mut().find(|i| i.name == iface) {
        i.outgoing_filter = Some(name);
    }
}

/// `a` and `b` share 10.0.0.0/30; `b` also serves 192.168.0.0/24 on `lan`.
pub fn two_routers() -> BoxResult<Network> {
    let a = router("a", &[("to-b", "10.0.0.1/30")])?;
    let b = router("b", &[("to-a", "10.0.0.2/30"), ("lan", "192.168.0.1/24")])?;
    Ok(Network::new(vec![a, b])?)
}

/// `a -- r -- b`, where `a` sends 172.16.0.0/16 to `r` and `r` has no
/// route for it.
pub fn dead_end() -> BoxResult<Network> {
    let mut a = router("a", &[("to-r", "10.0.0.1/30")])?;
    a.static_routes.push(static_route("172.16.0.0/16", "to-r")?);
    let r = router("r", &[("to-a", "10.0.0.2/30"), ("to-b", "10.0.1.1/30")])?;
    let b = router("b", &[("to-r", "10.0.1.2/30")])?;
    Ok(Network::new(vec![a, r, b])?)
}

/// `a` and `c` each hang off `b` and send `b`'s LAN 192.168.0.0/24 to it
/// with a static route.
pub fn hub() -> BoxResult<Network> {
    let mut a = router("a", &[("to-b", "10.0.0.1/30")])?;
    a.static_routes.push(static_route("192.168.0.0/24", "to-b")?);
    let mut c = router("c", &[("to-b", "10.0.1.1/30")])?;
    c.static_routes.push(static_route("192.168.0.0/24", "to-b")?);
    let b = router(
        "b",
        &[
            ("to-a", "10.0.0.2/30"),
            ("to-c", "10.0.1.2/30"),
            ("lan", "192.168.0.1/24"),
        ],
    )?;
    Ok(Network::new(vec![a, b, c])?)
}

fn parallel_pair() -> BoxResult<(Configuration, Configuration)> {
    let mut a = router("a", &[("to-b1", "10.0.0.1/30"), ("to-b2", "10.0.1.1/30")])?;
    a.static_routes.push(static_route("192.168.0.0/24", "to-b1")?);
    a.static_routes.push(static_route("192.168.0.0/24", "to-b2")?);
    let b = router(
        "b",
        &[
            ("to-a1", "10.0.0.2/30"),
            ("to-a2", "10.0.1.2/30"),
            ("lan", "192.168.0.1/24"),
        ],
    )?;
    Ok((a, b))
}

/// `a` has two parallel links to `b` and a static route for `b`'s LAN over
/// each.
pub fn parallel_links() -> BoxResult<Network> {
    let (a, b) = parallel_pair()?;
    Ok(Network::new(vec![a, b])?)
}

/// [`parallel_links`] where the second link drops everything on the way out.
pub fn parallel_links_one_filtered() -> BoxResult<Network> {
    let (mut a, b) = parallel_pair()?;
    block_outgoing(&mut a, "to-b2");
    Ok(Network::new(vec![a, b])?)
}

/// `a` and `b` point static routes for 172.16.0.0/16 at each other.
pub fn static_loop() -> BoxResult<Network> {
    let mut a = router("a", &[("to-b", "10.0.0.1/30")])?;
    a.static_routes.push(static_route("172.16.0.0/16", "to-b")?);
    let mut b = router("b", &[("to-a", "10.0.0.2/30")])?;
    b.static_routes.push(static_route("172.16.0.0/16", "to-a")?);
    Ok(Network::new(vec![a, b])?)
}
