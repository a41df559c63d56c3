mod app;

use anyhow::Result;

use crate::app::App;

#[tokio::main]
async fn main() -> Result<()> {
    let mut app = App::from_args(std::env::args().skip(1));
    app.init()?;
    app.run().await?;

    Ok(())
}
