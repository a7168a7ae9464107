//! Marketplace API endpoints.

use tracing::debug;

use crate::scaleway::error::ApiError;
use crate::scaleway::marketplace::{LocalImage, LocalImageQuery};
use crate::scaleway::{ApiFuture, MarketplaceApi};

use super::{HttpClient, Target};

impl MarketplaceApi for HttpClient {
    fn get_local_image_by_label<'a>(
        &'a self,
        query: &'a LocalImageQuery,
    ) -> ApiFuture<'a, LocalImage> {
        Box::pin(async move {
            let url = self.marketplace_url("/local-images");
            let params = [
                (String::from("image_label"), query.label.clone()),
                (String::from("zone"), query.zone.to_string()),
                (String::from("type"), query.image_type.to_string()),
            ];
            let images: Vec<LocalImage> = self.list_all(&url, &params, "local_images").await?;
            debug!(
                label = %query.label,
                zone = %query.zone,
                candidates = images.len(),
                "resolving marketplace image"
            );
            select_local_image(images, query)
        })
    }
}

/// Picks the first local image of the requested flavour that can boot the
/// requested commercial type.
fn select_local_image(
    images: Vec<LocalImage>,
    query: &LocalImageQuery,
) -> Result<LocalImage, ApiError> {
    let target = Target::new("marketplace_local_image", &query.label);
    images
        .into_iter()
        .find(|image| {
            image.image_type == query.image_type
                && image
                    .compatible_commercial_types
                    .iter()
                    .any(|commercial_type| commercial_type == &query.commercial_type)
        })
        .ok_or_else(|| ApiError::not_found(target.resource, target.id))
}
