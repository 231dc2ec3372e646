use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use blobnode::node::api::grpc::{self, blob_node_client::BlobNodeClient};
use clap::Parser;
use rand::{Rng, RngCore};
use tonic::transport::Channel;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    addr: String,
    #[arg(short, long)]
    count: u64,
    #[arg(short, long)]
    payload_size: usize,
    #[arg(short, long, default_value = "bench")]
    bucket: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let ch = Channel::from_shared(args.addr)?.connect().await?;
    let mut client = BlobNodeClient::new(ch);
    let mut rng = rand::rng();
    let mut store_total = Duration::ZERO;
    let mut retrieve_total = Duration::ZERO;

    for _ in 0..args.count {
        let key = format!("{}", rng.random::<u32>());
        let mut data = vec![0u8; args.payload_size];
        rng.fill_bytes(&mut data);
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos() as i64;

        let t = Instant::now();
        let resp = client
            .store(grpc::StoreRequest {
                bucket: args.bucket.clone(),
                key: key.clone(),
                data: data.clone(),
                timestamp,
            })
            .await?
            .into_inner();
        let store_took = t.elapsed();
        if !resp.success {
            bail!("store {key}: {}", resp.error);
        }

        let t = Instant::now();
        let resp = client
            .retrieve(grpc::RetrieveRequest {
                bucket: args.bucket.clone(),
                key: key.clone(),
            })
            .await?
            .into_inner();
        let retrieve_took = t.elapsed();
        if !resp.found || resp.data != data {
            bail!("retrieve {key}: found={} error={:?}", resp.found, resp.error);
        }

        println!(
            "store took {}us, retrieve took {}us",
            store_took.as_micros(),
            retrieve_took.as_micros()
        );
        store_total += store_took;
        retrieve_total += retrieve_took;
    }

    if args.count > 0 {
        println!(
            "{} objects of {} bytes: avg store {}us, avg retrieve {}us",
            args.count,
            args.payload_size,
            store_total.as_micros() / args.count as u128,
            retrieve_total.as_micros() / args.count as u128
        );
    }
    Ok(())
}
