/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::*;
use crate::tools::error::AppError;
use async_trait::async_trait;

/// Read-only view of the route registry owned by the upstream CRUD services.
/// The tracking engine only ever resolves records by id.
#[async_trait]
pub trait RouteLookup: Send + Sync {
    async fn route(&self, route_id: &RouteId) -> Result<Option<Route>, AppError>;
}

/// Read-only view of the warehouse registry.
#[async_trait]
pub trait WarehouseLookup: Send + Sync {
    async fn warehouse(&self, warehouse_id: &WarehouseId)
        -> Result<Option<Warehouse>, AppError>;
}
