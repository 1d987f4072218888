use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{
    decode_json, Kpis, LayerRequest, LayerScope, NewGameRequest, NewGameResponse, PlanAck,
    PlanPayload, RunSummary, SessionContext, SimulationGateway, TurnRequest, TurnResponse,
};
use crate::error::GatewayError;

/// Gateway speaking JSON and PNG over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
}

impl HttpGateway {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Bytes, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.bytes().await?)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let body = self.send(request).await?;
        Ok(decode_json(&body)?)
    }
}

fn scope_prefix(ctx: &SessionContext) -> &'static str {
    match ctx.scope {
        LayerScope::Region => "game",
        LayerScope::Farm => "farm",
    }
}

impl SimulationGateway for HttpGateway {
    async fn new_game(
        &self,
        ctx: &SessionContext,
        request: &NewGameRequest,
    ) -> Result<NewGameResponse, GatewayError> {
        let url = ctx.url("/game/new");
        debug!(%url, "creating run");
        let response: NewGameResponse = self.send_json(self.client.post(url).json(request)).await?;
        Ok(response.validate()?)
    }

    async fn fetch_layer(
        &self,
        ctx: &SessionContext,
        request: &LayerRequest,
    ) -> Result<Bytes, GatewayError> {
        let url = match ctx.scope {
            LayerScope::Region => ctx.url(&format!("/region/{}/layer", ctx.region_id)),
            LayerScope::Farm => ctx.url(&format!("/farm/{}/raster", ctx.run_id)),
        };
        debug!(%url, layer = %request.layer, season = request.season, "fetching layer");
        let query = [
            ("layer", request.layer.as_str().to_string()),
            ("season", request.season.to_string()),
            ("year", request.year.to_string()),
        ];
        self.send(self.client.get(url).query(&query)).await
    }

    async fn fetch_state(&self, ctx: &SessionContext) -> Result<Kpis, GatewayError> {
        let url = ctx.url(&format!("/{}/{}/state", scope_prefix(ctx), ctx.run_id));
        self.send_json(self.client.get(url)).await
    }

    async fn submit_plan(&self, ctx: &SessionContext, plan: &PlanPayload) -> Result<PlanAck, GatewayError> {
        let url = ctx.url(&format!("/{}/{}/plan", scope_prefix(ctx), ctx.run_id));
        debug!(%url, cells = plan.cells.len(), "uploading plan");
        self.send_json(self.client.post(url).json(plan)).await
    }

    async fn submit_turn(
        &self,
        ctx: &SessionContext,
        request: &TurnRequest,
    ) -> Result<TurnResponse, GatewayError> {
        let url = ctx.url("/simulate/turn");
        debug!(%url, year = request.year, "submitting turn");
        self.send_json(self.client.post(url).json(request)).await
    }

    async fn fetch_summary(&self, ctx: &SessionContext) -> Result<RunSummary, GatewayError> {
        let url = ctx.url(&format!("/summary/{}", ctx.run_id));
        self.send_json(self.client.get(url)).await
    }
}
