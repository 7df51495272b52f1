use emphub_subscribers::SubscriberKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    emphub_observability::init_service(SubscriberKind::Hr.name());
    emphub_subscribers::runtime::run(SubscriberKind::Hr).await
}
