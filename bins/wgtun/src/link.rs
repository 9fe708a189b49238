//! Commands that act on a kernel interface.

use std::fs;
use std::path::Path;

use tokio_stream::StreamExt;
use wgtun::net::{ApplyResult, NetworkConfigurator};
use wgtun::netlink::{NetlinkMonitor, NetlinkTable};
use wgtun::observer::AdapterStatusObserver;
use wgtun::{Config, InterfaceId, Result};

fn print_result(what: &str, result: &ApplyResult) {
    println!("{}: {}", what, result.summary_text());
    for err in &result.errors {
        eprintln!("  {}", err);
    }
}

pub async fn up(ifindex: u32, path: &Path) -> Result<()> {
    let config = Config::parse(&fs::read_to_string(path)?)?;
    let table = NetlinkTable::new()?;
    let network = NetworkConfigurator::new(&table, InterfaceId::from_index(ifindex));

    let addresses = network.add_addresses(&config.interface.addresses).await?;
    print_result("addresses", &addresses);
    let routes = network.add_routes(config.routes()).await?;
    print_result("routes", &routes);
    Ok(())
}

pub async fn down(ifindex: u32) -> Result<()> {
    let table = NetlinkTable::new()?;
    let network = NetworkConfigurator::new(&table, InterfaceId::from_index(ifindex));

    let addresses = network.remove_all_addresses().await?;
    print_result("addresses", &addresses);
    let routes = network.remove_all_routes().await?;
    print_result("routes", &routes);

    if !addresses.is_success() || !routes.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn monitor(indexes: &[u32]) -> Result<()> {
    let observer = AdapterStatusObserver::new(NetlinkMonitor::new()?);
    let mut events = observer.listen();

    for &index in indexes {
        observer.start_observing(InterfaceId::from_index(index)).await?;
    }

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "cannot serialize event"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    observer.stop_all_observing().await;
    Ok(())
}
