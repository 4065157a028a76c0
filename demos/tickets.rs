use condo_http::{filter, CondoClient, FetchResult, TicketFilter, TicketStatus, RETRY_ACTION_LABEL};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let condo_id = std::env::var("CONDO_ID")?;
    let api = CondoClient::from_env()?;
    let tickets = api.tickets_resource(&condo_id)?;

    tickets.refresh().await;

    match tickets.snapshot() {
        FetchResult::Success { data, .. } => {
            let open = TicketFilter {
                status: Some(TicketStatus::Pending),
                ..TicketFilter::default()
            };
            for ticket in open.apply(&data) {
                println!("[{:?}] {} ({})", ticket.priority, ticket.title, ticket.id);
            }
            println!("{:?}", filter::count_by_status(&data));
        }
        FetchResult::Error { error, .. } => {
            println!("{error} ({})", tickets.progress_label());
            println!("-> {RETRY_ACTION_LABEL}");
        }
        FetchResult::Loading { .. } => println!("{}", tickets.progress_label()),
    }

    Ok(())
}
