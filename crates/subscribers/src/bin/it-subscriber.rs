use emphub_subscribers::SubscriberKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    emphub_observability::init_service(SubscriberKind::It.name());
    emphub_subscribers::runtime::run(SubscriberKind::It).await
}
