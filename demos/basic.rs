use serde_json::{json, Value};
use shopline_http::{ShoplineClient, ShoplineError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = ShoplineClient::from_env().map_err(anyhow::Error::msg)?;

    let products: Option<Value> = client.get("/products?per_page=5").await?;
    println!("{products:#?}");

    let created: Option<Value> = client
        .post("/customers", &json!({"customer": {"email": "kit@example.com"}}))
        .await?;
    println!("{created:#?}");

    match client.get::<Value>("/orders/does-not-exist").await {
        Ok(order) => println!("{order:#?}"),
        Err(ShoplineError::Api(err)) => {
            println!("api error {} {}: {}", err.status, err.code, err.message)
        }
        Err(ShoplineError::RateLimited(err)) => println!("slow down for {:?}", err.retry_after),
        Err(ShoplineError::CircuitOpen(_)) => println!("backend unhealthy, try later"),
        Err(other) => return Err(other.into()),
    }

    println!("{:?}", client.circuit_state());
    Ok(())
}
