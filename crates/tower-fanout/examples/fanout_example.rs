use std::time::Duration;
use tower::{Layer, Service, ServiceExt};
use tower_fanout::{
    DependencyError, DependencyRequest, DispatcherLayer, ErrorAction, Request,
    SimulatedDependency,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Tower Fan-out Example");
    println!("=====================\n");

    // Example 1: Race - the first error decides the attempt
    println!("Example 1: Race fan-in with one retry");
    let service = tower::service_fn(|req: DependencyRequest| async move {
        if req.depth == 0 && req.dependency == "SC" {
            println!("  {} failing with RECURSE", req.call_site());
            return Err(DependencyError::Recurse {
                cause: req.call_site(),
            });
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Duration::from_millis(20))
    });

    let mut dispatcher = DispatcherLayer::builder()
        .race()
        .on_error(|dependency, kind, action| {
            println!("  [ERROR] {} ({}) -> {:?}", dependency, kind, action);
        })
        .on_resolved(|depth, succeeded| {
            println!("  [RESOLVED] depth {} succeeded: {}", depth, succeeded);
        })
        .build()
        .layer(service);

    let report = dispatcher.ready().await?.call(Request::new(1)).await?;
    println!("  Result: {:?}\n", report);

    // Example 2: Drain - every error starts its own retry chain
    println!("Example 2: Drain fan-in, two recurse errors");
    let service = tower::service_fn(|req: DependencyRequest| async move {
        if req.depth == 0 && (req.dependency == "SA" || req.dependency == "SD") {
            return Err(DependencyError::Recurse {
                cause: req.call_site(),
            });
        }
        Ok(Duration::ZERO)
    });

    let mut dispatcher = DispatcherLayer::builder()
        .drain()
        .on_error(|dependency, _, action| {
            if action == ErrorAction::Recurse {
                println!("  [CHAIN] {} starts a retry chain", dependency);
            }
        })
        .build()
        .layer(service);

    let report = dispatcher.ready().await?.call(Request::new(2)).await?;
    println!("  Attempts: {}\n", report.attempts);

    // Example 3: Simulated dependency with a depth cap
    println!("Example 3: Simulated dependency, always recurse, max depth 2");
    let simulated = SimulatedDependency::builder()
        .max_latency(Duration::from_millis(10))
        .error_interval(1)
        .recurse_interval(1)
        .seed(42)
        .build();

    let mut dispatcher = DispatcherLayer::builder()
        .race()
        .max_depth(2)
        .build()
        .layer(simulated);

    match dispatcher.ready().await?.call(Request::new(3)).await {
        Ok(report) => println!("  Unexpected success: {:?}", report),
        Err(e) => println!("  Gave up: {}", e),
    }

    Ok(())
}
