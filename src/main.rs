use std::env;
use std::sync::Arc;

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use pip_services_aws::config::ConfigParams;
use pip_services_aws::container::CommandableLambdaFunction;
use pip_services_aws::count::{CloudWatchCounters, Counters};
use pip_services_aws::dummy::{controller_descriptor, dummy_references, DummyController};
use pip_services_aws::log::CloudWatchLogger;
use pip_services_aws::refer::Descriptor;
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

const FUNCTION_NAME: &str = "dummies";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // CLOUDWATCH__CONNECTION__REGION=.. style variables ship logs and counters
    let cloudwatch = ConfigParams::from_env().get_section("cloudwatch");
    let name = env::var("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_else(|_| FUNCTION_NAME.to_string());
    let instance = env::var("AWS_LAMBDA_LOG_STREAM_NAME")
        .unwrap_or_else(|_| Uuid::new_v4().simple().to_string());

    let logger = CloudWatchLogger::new();
    if cloudwatch.is_empty() {
        pip_services_aws::set_up_logging();
    } else {
        logger.configure(&cloudwatch)?;
        logger.set_context(&name, &instance);
        pip_services_aws::set_up_logging_with(logger.layer());
    }

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let mut references = dummy_references(DummyController::new());
    if !cloudwatch.is_empty() {
        logger.open(Some(&name)).await.inspect_err(|err| {
            error!("Failed to open CloudWatch logger: {}", err);
        })?;

        let counters = CloudWatchCounters::new();
        counters.configure(&cloudwatch);
        counters.set_context(&name, &instance);
        counters.open(Some(&name)).await.inspect_err(|err| {
            error!("Failed to open CloudWatch counters: {}", err);
        })?;
        let counters: Arc<dyn Counters> = Arc::new(counters);
        references.put(
            Descriptor::new("pip-services", "counters", "cloudwatch", "default", "1.0"),
            counters,
        );
    }

    let mut function =
        CommandableLambdaFunction::commandable(&name, "Dummy lambda function", controller_descriptor());
    function.set_references(&references)?;
    function.run().await.inspect_err(|err| {
        error!(correlation_id = name.as_str(), "Failed to start {}: {}", name, err);
    })?;

    run(service_fn(|request: LambdaEvent<Value>| function.handler(request))).await
}
