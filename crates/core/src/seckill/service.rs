use std::sync::Arc;

use flashmart_common::{Clock, SystemClock};
use flashmart_domain::{
    AdmissionVerdict, FlashMartError, OrderMessage, Result, SeckillConfig, SeckillVoucher,
};
use tracing::{debug, info};

use crate::id::IdGenerator;
use crate::repositories::VoucherRepository;
use crate::store_ports::{AdmissionStore, StreamStore};

const ORDER_ID_PREFIX: &str = "order";

/// Flash-sale entry point: admission check + durable enqueue
///
/// The expensive, transactional persistence happens asynchronously in
/// [`super::OrderConsumer`]; this service answers the caller as soon as the
/// request is admitted and durably queued.
pub struct SeckillService<C = SystemClock> {
    ids: IdGenerator<C>,
    admission: Arc<dyn AdmissionStore>,
    stream: Arc<dyn StreamStore>,
    vouchers: Arc<dyn VoucherRepository>,
    order_stream: String,
}

impl<C> SeckillService<C>
where
    C: Clock,
{
    pub fn new(
        ids: IdGenerator<C>,
        admission: Arc<dyn AdmissionStore>,
        stream: Arc<dyn StreamStore>,
        vouchers: Arc<dyn VoucherRepository>,
        config: &SeckillConfig,
    ) -> Self {
        Self { ids, admission, stream, vouchers, order_stream: config.order_stream.clone() }
    }

    /// Place a flash-sale order for `user_id`.
    ///
    /// One order id per request; the same value goes into the queue message
    /// and the synchronous reply. Oversell and duplicate-order races are
    /// settled entirely inside the store's atomic admission step.
    pub async fn place_order(&self, voucher_id: i64, user_id: i64) -> Result<i64> {
        let order_id = self.ids.next_id(ORDER_ID_PREFIX).await?;

        match self.admission.admit(voucher_id, user_id).await? {
            AdmissionVerdict::SoldOut => {
                debug!(voucher_id, user_id, "seckill.rejected_sold_out");
                Err(FlashMartError::SoldOut)
            }
            AdmissionVerdict::Duplicate => {
                debug!(voucher_id, user_id, "seckill.rejected_duplicate");
                Err(FlashMartError::Duplicate)
            }
            AdmissionVerdict::Admitted => {
                let message = OrderMessage { order_id, user_id, voucher_id };
                let entry_id = self.stream.append(&self.order_stream, &message).await?;
                info!(order_id, user_id, voucher_id, entry_id = %entry_id, "seckill.order_queued");
                Ok(order_id)
            }
        }
    }

    /// Persist a new voucher and seed its stock counter into the store, the
    /// precondition for admission checks on it.
    pub async fn publish_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        self.vouchers.insert(voucher).await?;
        self.admission.seed_stock(voucher.id, voucher.stock).await?;
        info!(voucher_id = voucher.id, stock = voucher.stock, "seckill.voucher_published");
        Ok(())
    }
}
