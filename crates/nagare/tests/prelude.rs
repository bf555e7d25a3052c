//! Facade smoke test: the prelude covers everyday usage.

use nagare::prelude::*;

#[tokio::test]
async fn prelude_covers_pipeline_and_backpressure_usage() {
    let out = Stream::range(1, 6)
        .map(|v| Value::Int(v.as_i64().unwrap_or(0) * 2))
        .filter(|v| v.as_i64().unwrap_or(0) > 5)
        .to_array()
        .await
        .unwrap();
    assert_eq!(out, vec![Value::Int(6), Value::Int(8), Value::Int(10)]);

    let credits = CreditController::new(4);
    assert!(credits.try_consume(4));
    assert!(credits.is_exhausted());

    let frame = FrameSequencer::new().stamp(Payload::Control(ControlMessage::Credit(2)));
    let codec = BinaryFrameCodec::new();
    let decoded = codec.decode(&codec.encode(&frame).unwrap()).unwrap();
    assert_eq!(decoded, frame);
}

#[tokio::test]
async fn prelude_covers_windowed_aggregate() {
    let out = Stream::from_values([1, 2, 3, 4, 5])
        .windowed_aggregate(3, WindowOp::Mean)
        .to_array()
        .await
        .unwrap();
    assert_eq!(
        out,
        vec![Value::Float(2.0), Value::Float(3.0), Value::Float(4.0)]
    );
}
