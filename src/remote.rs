use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, Response};

use crate::errors::RemoteError;
use crate::material::Material;
use crate::urls::Urls;

/// The remote source of truth for material guides.
pub trait MaterialsApi: Send + Sync {
    /// Fetches every material, in the order the API returns them.
    fn list(&self) -> BoxFuture<'_, Result<Vec<Material>, RemoteError>>;

    /// Stores `material` and returns the stored value.
    fn save(&self, material: Material) -> BoxFuture<'_, Result<Material, RemoteError>>;

    /// Deletes the material with the given ID.
    fn delete(&self, id: &str) -> BoxFuture<'_, Result<(), RemoteError>>;
}

/// Talks to the materials API over HTTP.
pub struct HttpMaterialsApi {
    client: Client,
    urls: Urls,
}

impl HttpMaterialsApi {
    pub fn new(client: Client, urls: Urls) -> Self {
        HttpMaterialsApi { client, urls }
    }

    pub fn urls(&self) -> &Urls {
        &self.urls
    }
}

impl MaterialsApi for HttpMaterialsApi {
    fn list(&self) -> BoxFuture<'_, Result<Vec<Material>, RemoteError>> {
        async move {
            let response = self.client.get(self.urls.materials()?).send().await?;
            let materials: Vec<Material> = check_status(response)?.json().await?;

            Ok(materials)
        }
        .boxed()
    }

    fn save(&self, material: Material) -> BoxFuture<'_, Result<Material, RemoteError>> {
        async move {
            let url = self.urls.material(&material.id)?;
            let response = self.client.put(url).json(&material).send().await?;
            let stored: Material = check_status(response)?.json().await?;

            Ok(stored)
        }
        .boxed()
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, Result<(), RemoteError>> {
        let url = self.urls.material(id);

        async move {
            let response = self.client.delete(url?).send().await?;
            check_status(response)?;

            Ok(())
        }
        .boxed()
    }
}

fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        Err(RemoteError::Status(status.as_u16()))
    }
}
